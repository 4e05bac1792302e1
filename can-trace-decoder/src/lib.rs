//! CAN Trace Decoder Library
//!
//! Decodes USB-CANmodul binary CAN traces into the canonical text trace and
//! provides filtering and aggregation over the decoded messages.
//!
//! # Architecture
//!
//! - [`header`] reads and writes the fixed binary header
//! - [`decoder`] turns the record stream after the header into [`CanRecord`]s
//! - [`format`] renders records, header block, legend and footer as text
//! - [`text`] parses canonical text back into analysis records
//! - [`filter`] selects records by an AND of optional predicates
//! - [`views`] projects a selection into summaries, timelines and frequencies
//! - [`analysis`] ties the record set, filters and views together
//!
//! The library never writes files and never prints; progress is reported over
//! an optional channel and diagnostics go through the `log` facade.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_trace_decoder::{Analysis, Decoder, DecoderConfig, FilterCriteria, ViewKind};
//! use std::path::Path;
//!
//! let config = DecoderConfig::new().with_differential(false);
//! let decoder = Decoder::new(config.clone());
//! let trace = decoder.decode_file(Path::new("trace.bin"), None).unwrap();
//!
//! print!("{}", can_trace_decoder::format::render_trace(&trace, "trace.bin", &config));
//!
//! let analysis = Analysis::from_decoded(&trace, "trace.bin", &config);
//! let selection = analysis
//!     .filter(&FilterCriteria::new().with_can_id("18FF"))
//!     .unwrap();
//! let view = analysis.view(ViewKind::Frequency, &selection);
//! println!("{:?}", view);
//! ```

pub mod analysis;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod format;
pub mod header;
pub mod text;
pub mod types;
pub mod views;

// Re-export main types for convenience
pub use analysis::{Analysis, Selection};
pub use config::DecoderConfig;
pub use decoder::{CancelToken, DecodeProgress, Decoder};
pub use filter::{FilterCriteria, FixedSliceSourceId, FunctionCode, SourceIdExtractor};
pub use text::{ParsedTrace, TextRecord};
pub use types::{
    CanRecord, ChannelInfo, DecodedTrace, DecoderError, Direction, FrameFlags, HardwareInfo,
    Result, TraceHeader,
};
pub use views::{FrequencyRow, IdSummary, TimelineBucket, TraceStatistics, View, ViewKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let decoder = Decoder::default();
        assert!(!decoder.config().differential);

        let trace = decoder.decode_bytes(&[], None);
        assert!(trace.is_err());
    }
}
