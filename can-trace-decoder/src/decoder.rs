//! Binary trace decoder
//!
//! This module provides the entry point for turning a binary USB-CANmodul
//! trace into a [`DecodedTrace`]. The header is decoded first, then fixed
//! 18 byte message records are read until the input is exhausted:
//!
//! ```text
//! id (u32) | frame flags (u8) | dlc (u8) | data (8 x u8) | time (u32)
//! ```
//!
//! Running out of input is the normal end of a trace. Any other read failure
//! aborts the whole decode and only the number of records read so far is
//! reported back.

use crate::config::DecoderConfig;
use crate::header::{decode_header, encode_header, encoded_len};
use crate::types::{
    CanRecord, DecodedTrace, DecoderError, FrameFlags, Result, TraceHeader, RECORD_SIZE,
};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Cursor, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Notification sent to the caller while a trace is being decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeProgress {
    /// Human readable phase description
    Status(String),
    /// Number of records decoded so far
    Records(usize),
}

/// Shared flag used to abort a running decode
///
/// The flag is polled at every progress tick, so a cancelled decode stops
/// within one progress interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The main decoder struct - entry point for all decoding operations
pub struct Decoder {
    config: DecoderConfig,
    cancel: Option<CancelToken>,
}

impl Decoder {
    /// Create a new decoder instance
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Builder method: allow the decode to be aborted through `token`
    ///
    /// The token is checked after every record, independent of the progress
    /// interval.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a binary trace file
    ///
    /// The whole file is loaded into memory before decoding.
    ///
    /// # Example
    /// ```no_run
    /// use can_trace_decoder::{Decoder, DecoderConfig};
    /// use std::path::Path;
    ///
    /// let decoder = Decoder::new(DecoderConfig::new());
    /// let trace = decoder.decode_file(Path::new("trace.bin"), None).unwrap();
    /// println!("{} messages", trace.records.len());
    /// ```
    pub fn decode_file(
        &self,
        path: &Path,
        progress: Option<&Sender<DecodeProgress>>,
    ) -> Result<DecodedTrace> {
        log::info!("Decoding binary trace: {:?}", path);

        if !path.exists() {
            return Err(DecoderError::InputNotFound(path.display().to_string()));
        }

        notify(progress, DecodeProgress::Status("Reading binary trace file...".into()));
        let bytes = std::fs::read(path).map_err(|e| DecoderError::io(0, e))?;
        self.decode_bytes(&bytes, progress)
    }

    /// Decode a trace held in memory
    pub fn decode_bytes(
        &self,
        bytes: &[u8],
        progress: Option<&Sender<DecodeProgress>>,
    ) -> Result<DecodedTrace> {
        self.decode_reader(Cursor::new(bytes), bytes.len() as u64, progress)
    }

    /// Decode a trace from any reader
    ///
    /// `stream_len` is the total number of bytes the reader will deliver and is
    /// needed to validate the header's message offset.
    pub fn decode_reader<R: Read>(
        &self,
        mut reader: R,
        stream_len: u64,
        progress: Option<&Sender<DecodeProgress>>,
    ) -> Result<DecodedTrace> {
        let header = decode_header(&mut reader, stream_len)?;

        let consumed = encoded_len(&header);
        if consumed != header.message_offset as usize {
            log::warn!(
                "Header ends at offset 0x{:X} but declares messages at 0x{:X}, reading sequentially",
                consumed,
                header.message_offset
            );
        }
        if !header.channels[0].is_active && !header.channels[1].is_active {
            log::warn!("No active CAN channel in trace header, using channel 1 settings");
        }

        notify(progress, DecodeProgress::Status("Converting messages...".into()));

        let mut records = Vec::new();
        let mut buf = [0u8; RECORD_SIZE];
        loop {
            let filled = fill_record(&mut reader, &mut buf)
                .map_err(|e| DecoderError::io(records.len(), e))?;

            if filled == 0 {
                break;
            }
            if filled < RECORD_SIZE {
                log::warn!(
                    "Ignoring truncated message record at end of trace ({} of {} bytes)",
                    filled,
                    RECORD_SIZE
                );
                break;
            }

            let record = parse_record(&buf);
            log::trace!("Record {}: {:?}", records.len(), record);
            records.push(record);

            if self.config.is_progress_tick(records.len()) {
                notify(progress, DecodeProgress::Records(records.len()));
            }
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                log::info!("Decode cancelled after {} messages", records.len());
                return Err(DecoderError::Cancelled {
                    records_read: records.len(),
                });
            }
        }

        notify(progress, DecodeProgress::Records(records.len()));
        notify(
            progress,
            DecodeProgress::Status(format!(
                "Conversion complete: {} messages processed.",
                records.len()
            )),
        );
        log::info!("Decoded {} CAN messages", records.len());

        Ok(DecodedTrace { header, records })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

/// Send a progress notification, ignoring a receiver that went away
fn notify(progress: Option<&Sender<DecodeProgress>>, message: DecodeProgress) {
    if let Some(tx) = progress {
        let _ = tx.send(message);
    }
}

/// Read up to one record into `buf`, returning the number of bytes filled
///
/// Returns 0 at a clean end of input and less than `RECORD_SIZE` when the
/// input ends inside a record.
fn fill_record<R: Read>(reader: &mut R, buf: &mut [u8; RECORD_SIZE]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn parse_record(buf: &[u8; RECORD_SIZE]) -> CanRecord {
    let mut data = [0u8; 8];
    data.copy_from_slice(&buf[6..14]);
    CanRecord {
        id: LittleEndian::read_u32(&buf[0..4]),
        flags: FrameFlags(buf[4]),
        dlc: buf[5],
        data,
        time: LittleEndian::read_u32(&buf[14..18]),
    }
}

/// Write one message record in the binary layout
pub fn encode_record<W: Write>(record: &CanRecord, writer: &mut W) -> io::Result<()> {
    let mut buf = [0u8; RECORD_SIZE];
    LittleEndian::write_u32(&mut buf[0..4], record.id);
    buf[4] = record.flags.bits();
    buf[5] = record.dlc;
    buf[6..14].copy_from_slice(&record.data);
    LittleEndian::write_u32(&mut buf[14..18], record.time);
    writer.write_all(&buf)
}

/// Serialize a header and its records into a complete binary trace
pub fn encode_trace(header: &TraceHeader, records: &[CanRecord]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(header) + records.len() * RECORD_SIZE);
    encode_header(header, &mut out)?;
    for record in records {
        encode_record(record, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelInfo, TRACE_SIGNATURE};
    use std::sync::mpsc;

    fn header() -> TraceHeader {
        let mut header = TraceHeader {
            signature: TRACE_SIGNATURE,
            ..TraceHeader::default()
        };
        header.channels[0] = ChannelInfo {
            is_active: true,
            ..ChannelInfo::default()
        };
        header.message_offset = encoded_len(&header) as u32;
        header
    }

    fn record(id: u32, time: u32) -> CanRecord {
        CanRecord {
            id,
            flags: FrameFlags::default(),
            dlc: 2,
            data: [0xAA, 0xBB, 0, 0, 0, 0, 0, 0],
            time,
        }
    }

    /// Reader that fails with a non-EOF error once `limit` bytes were delivered
    struct FailingReader {
        data: Vec<u8>,
        pos: usize,
        limit: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.limit {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "device removed"));
            }
            let end = (self.pos + buf.len()).min(self.limit).min(self.data.len());
            let n = end - self.pos;
            buf[..n].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(n)
        }
    }

    #[test]
    fn test_decode_records_until_eof() {
        let records = vec![record(0x100, 10), record(0x200, 20), record(0x300, 35)];
        let bytes = encode_trace(&header(), &records).unwrap();

        let trace = Decoder::default().decode_bytes(&bytes, None).unwrap();
        assert_eq!(trace.records, records);
        assert_eq!(trace.header, header());
    }

    #[test]
    fn test_empty_trace() {
        let bytes = encode_trace(&header(), &[]).unwrap();
        let trace = Decoder::default().decode_bytes(&bytes, None).unwrap();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_truncated_tail_is_end_of_data() {
        let records = vec![record(0x100, 10), record(0x200, 20)];
        let mut bytes = encode_trace(&header(), &records).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);

        let trace = Decoder::default().decode_bytes(&bytes, None).unwrap();
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_dlc_is_not_clamped() {
        let mut rec = record(0x7FF, 1);
        rec.dlc = 12;
        let bytes = encode_trace(&header(), &[rec]).unwrap();
        let trace = Decoder::default().decode_bytes(&bytes, None).unwrap();
        assert_eq!(trace.records[0].dlc, 12);
        assert_eq!(trace.records[0].payload().len(), 8);
    }

    #[test]
    fn test_io_failure_aborts_with_count() {
        let records: Vec<_> = (0..5).map(|i| record(i, i * 10)).collect();
        let data = encode_trace(&header(), &records).unwrap();
        let len = data.len() as u64;
        let limit = header().message_offset as usize + 3 * RECORD_SIZE + 4;
        let reader = FailingReader { data, pos: 0, limit };

        let err = Decoder::default().decode_reader(reader, len, None).unwrap_err();
        assert_eq!(err.code(), 0x7FFF);
        assert_eq!(err.records_read(), Some(3));
    }

    #[test]
    fn test_progress_notifications() {
        let records: Vec<_> = (0..1200).map(|i| record(0x10, i)).collect();
        let bytes = encode_trace(&header(), &records).unwrap();
        let (tx, rx) = mpsc::channel();

        Decoder::default().decode_bytes(&bytes, Some(&tx)).unwrap();
        drop(tx);

        let counts: Vec<usize> = rx
            .iter()
            .filter_map(|p| match p {
                DecodeProgress::Records(n) => Some(n),
                DecodeProgress::Status(_) => None,
            })
            .collect();
        assert_eq!(counts, vec![500, 1000, 1200]);
    }

    #[test]
    fn test_dropped_receiver_does_not_fail_decode() {
        let bytes = encode_trace(&header(), &[record(1, 1)]).unwrap();
        let (tx, rx) = mpsc::channel();
        drop(rx);
        assert!(Decoder::default().decode_bytes(&bytes, Some(&tx)).is_ok());
    }

    #[test]
    fn test_cancellation() {
        let records: Vec<_> = (0..20).map(|i| record(0x10, i)).collect();
        let bytes = encode_trace(&header(), &records).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let decoder = Decoder::new(DecoderConfig::new().with_progress_interval(5))
            .with_cancel_token(token);
        let err = decoder.decode_bytes(&bytes, None).unwrap_err();
        assert!(matches!(err, DecoderError::Cancelled { records_read: 1 }));
        assert_eq!(err.code(), 0x7FFE);
    }

    #[test]
    fn test_cancellation_without_progress_ticks() {
        let records: Vec<_> = (0..20).map(|i| record(0x10, i)).collect();
        let bytes = encode_trace(&header(), &records).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let decoder = Decoder::new(DecoderConfig::new().with_progress_interval(0))
            .with_cancel_token(token);
        let err = decoder.decode_bytes(&bytes, None).unwrap_err();
        assert_eq!(err.records_read(), Some(1));
    }

    #[test]
    fn test_uncancelled_token_decodes_everything() {
        let records: Vec<_> = (0..20).map(|i| record(0x10, i)).collect();
        let bytes = encode_trace(&header(), &records).unwrap();

        let decoder = Decoder::new(DecoderConfig::new().with_progress_interval(0))
            .with_cancel_token(CancelToken::new());
        assert_eq!(decoder.decode_bytes(&bytes, None).unwrap().len(), 20);
    }

    #[test]
    fn test_missing_file() {
        let err = Decoder::default()
            .decode_file(Path::new("does/not/exist.bin"), None)
            .unwrap_err();
        assert_eq!(err.code(), 0x1000);
    }
}
