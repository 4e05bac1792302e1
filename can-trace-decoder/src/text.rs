//! Text trace parser
//!
//! Reads back the canonical text produced by [`crate::format`]. This is the
//! import path for traces that are only available as text; it is lossy:
//! high resolution timestamps do not parse as integers and end up as 0, and
//! data tokens that are neither `--` nor hex are skipped, which shifts the
//! following byte positions.
//!
//! Lines that do not have at least four whitespace separated tokens are
//! dropped and counted in [`ParsedTrace::dropped_lines`].

use crate::format::{self, FOOTER_PREFIX, LEGEND, SEPARATOR};
use crate::types::{CanRecord, TraceHeader};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One message of a text trace, as used by the analysis stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// `RX` or `TX`
    pub direction: String,
    /// Time column exactly as printed
    pub time: String,
    /// Time in milliseconds, 0 if the time column is not an integer
    pub time_value: i64,
    /// CAN-ID column, e.g. `123h`
    pub can_id: String,
    /// DLC digits from the `(n)` column, empty if missing
    pub dlc: String,
    /// Everything after the DLC column
    pub data: String,
    /// Parsed data bytes (`--` becomes 0)
    pub data_bytes: Vec<u8>,
    /// The complete source line
    pub raw_line: String,
}

impl TextRecord {
    /// Build the analysis record for a decoded message without going through text
    ///
    /// `time` is the printed timestamp (absolute or differential). For high
    /// resolution traces `time_value` holds whole milliseconds.
    pub fn from_can_record(record: &CanRecord, header: &TraceHeader, time: u32) -> Self {
        let channel = header.active_channel();
        let high_res = header.high_res_timestamps();

        let data_bytes = if record.flags.is_remote() {
            Vec::new()
        } else {
            let payload = record.payload();
            (0..8).map(|i| payload.get(i).copied().unwrap_or(0)).collect()
        };

        Self {
            direction: record.direction().to_string(),
            time: format::format_time(time, high_res).trim_end().to_string(),
            time_value: if high_res {
                i64::from(time / 10)
            } else {
                i64::from(time)
            },
            can_id: format::format_can_id(record),
            dlc: record.dlc.to_string(),
            data: format::format_data(record),
            data_bytes,
            raw_line: format::format_record(record, channel, &header.hardware, time),
        }
    }
}

/// Result of parsing a complete text trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrace {
    /// Header block lines joined with `\n`
    pub header: String,
    pub records: Vec<TextRecord>,
    /// Candidate lines that could not be parsed
    pub dropped_lines: usize,
}

fn dlc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+)\)").expect("valid DLC regex"))
}

fn data_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+)\)\s+(.+)$").expect("valid data regex"))
}

/// Parse a complete text trace
pub fn parse_trace_text(text: &str) -> ParsedTrace {
    let mut header_lines = Vec::new();
    let mut header_ended = false;
    let mut parsed = ParsedTrace::default();

    for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        if !header_ended {
            if line.contains("===") {
                header_ended = true;
            } else {
                header_lines.push(line);
            }
            continue;
        }

        if line.contains("===") || line.contains("DIR TIME(msec)") || line.trim().is_empty() {
            continue;
        }
        if line.starts_with("Total number") {
            break;
        }

        match parse_line(line) {
            Some(record) => parsed.records.push(record),
            None => {
                log::debug!("Dropping unparsable trace line: {:?}", line);
                parsed.dropped_lines += 1;
            }
        }
    }

    if parsed.dropped_lines > 0 {
        log::warn!(
            "{} trace lines could not be parsed and were dropped",
            parsed.dropped_lines
        );
    }
    log::info!("Parsed {} messages from text trace", parsed.records.len());

    parsed.header = header_lines.join("\n");
    parsed
}

/// Parse one message line, `None` if it has fewer than four tokens
pub fn parse_line(line: &str) -> Option<TextRecord> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let dlc = dlc_regex()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let data = data_regex()
        .captures(line)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(TextRecord {
        direction: parts[0].trim_end_matches(':').to_string(),
        time: parts[1].to_string(),
        time_value: parts[1].parse().unwrap_or(0),
        can_id: parts[2].to_string(),
        dlc,
        data_bytes: parse_data_bytes(&data),
        data,
        raw_line: line.to_string(),
    })
}

/// Convert the data column into bytes; unrecognised tokens are skipped
pub fn parse_data_bytes(data: &str) -> Vec<u8> {
    data.split_whitespace()
        .filter_map(|token| {
            if token == "--" {
                Some(0)
            } else if (1..=2).contains(&token.len()) && token.chars().all(|c| c.is_ascii_hexdigit())
            {
                u8::from_str_radix(token, 16).ok()
            } else {
                None
            }
        })
        .collect()
}

/// Text trace containing only `records`, as written by the filtered export
pub fn render_export<'a, I>(header: &str, records: I, exported_at: NaiveDateTime) -> String
where
    I: IntoIterator<Item = &'a TextRecord>,
{
    let mut out = String::new();
    out.push_str(header.trim_end_matches('\n'));
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(LEGEND);
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push('\n');

    let mut count = 0usize;
    for record in records {
        out.push_str(&record.raw_line);
        out.push('\n');
        count += 1;
    }

    out.push('\n');
    out.push_str(&format!("{FOOTER_PREFIX} {count}\n"));
    out.push_str(&format!(
        "Exported on: {}\n",
        exported_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out
}
