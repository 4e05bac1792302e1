//! Analysis session over one trace
//!
//! [`Analysis`] owns the complete record set and the CAN-ID grouping index.
//! Filters never mutate it; each call to [`Analysis::filter`] recomputes the
//! selection from the full set and the views project that selection.

use crate::config::DecoderConfig;
use crate::filter::{self, FilterCriteria, SourceIdExtractor};
use crate::format::{render_header, DifferentialClock};
use crate::text::{self, TextRecord};
use crate::types::{DecodedTrace, Result};
use crate::views::{self, GroupIndex, TraceStatistics, View, ViewKind, DEFAULT_BUCKET_WIDTH};
use chrono::NaiveDateTime;

/// Indices into [`Analysis::records`] chosen by a filter, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(Vec<usize>);

impl Selection {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    header: String,
    records: Vec<TextRecord>,
    index: GroupIndex,
    dropped_lines: usize,
    bucket_width: i64,
}

impl Analysis {
    pub fn new(header: String, records: Vec<TextRecord>, dropped_lines: usize) -> Self {
        let index = GroupIndex::build(&records);
        log::debug!(
            "Analysis over {} messages with {} distinct CAN IDs",
            records.len(),
            index.len()
        );
        Self {
            header,
            records,
            index,
            dropped_lines,
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }

    /// Lossless path: build the record set straight from decoded messages
    pub fn from_decoded(trace: &DecodedTrace, input_name: &str, config: &DecoderConfig) -> Self {
        let mut clock = DifferentialClock::new(config.differential);
        let records = trace
            .records
            .iter()
            .map(|record| TextRecord::from_can_record(record, &trace.header, clock.next(record.time)))
            .collect();
        let header = render_header(trace, input_name).trim_end().to_string();
        Self::new(header, records, 0)
    }

    /// Lossy path: re-parse a canonical text trace
    pub fn from_text(text: &str) -> Self {
        let parsed = text::parse_trace_text(text);
        Self::new(parsed.header, parsed.records, parsed.dropped_lines)
    }

    /// Timeline bucket width, values below 1 are clamped to 1
    pub fn with_bucket_width(mut self, width: i64) -> Self {
        self.bucket_width = width.max(1);
        self
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn records(&self) -> &[TextRecord] {
        &self.records
    }

    /// Lines that the text parser could not read
    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }

    /// Distinct CAN IDs of the full set, sorted, for pick lists
    pub fn unique_ids(&self) -> Vec<&str> {
        self.index.sorted_ids()
    }

    /// Selection containing every record
    pub fn select_all(&self) -> Selection {
        Selection((0..self.records.len()).collect())
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> Result<Selection> {
        criteria.validate()?;
        Ok(Selection(filter::apply(&self.records, criteria)))
    }

    pub fn filter_with(
        &self,
        criteria: &FilterCriteria,
        source: &dyn SourceIdExtractor,
    ) -> Result<Selection> {
        criteria.validate()?;
        Ok(Selection(filter::apply_with(&self.records, criteria, source)))
    }

    pub fn view(&self, kind: ViewKind, selection: &Selection) -> View<'_> {
        let selected = selection.indices();
        match kind {
            ViewKind::All => View::Messages(views::identity(&self.records, selected)),
            ViewKind::Unique => View::Unique(views::id_summary(&self.index, &self.records, selected)),
            ViewKind::Timeline => {
                View::Timeline(views::timeline(&self.records, selected, self.bucket_width))
            }
            ViewKind::Frequency => {
                View::Frequency(views::frequency(&self.index, &self.records, selected))
            }
            ViewKind::Stats => View::Stats(self.statistics(selection)),
        }
    }

    pub fn statistics(&self, selection: &Selection) -> TraceStatistics {
        views::statistics(&self.index, &self.records, selection.indices())
    }

    /// Text trace holding only the selected records
    pub fn export(&self, selection: &Selection, exported_at: NaiveDateTime) -> String {
        text::render_export(
            &self.header,
            views::identity(&self.records, selection.indices()),
            exported_at,
        )
    }
}
