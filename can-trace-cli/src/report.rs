//! Report rendering
//!
//! Renders analysis views as plain text tables or as JSON.

use anyhow::{Context, Result};
use can_trace_decoder::{FrequencyRow, IdSummary, TimelineBucket, TraceStatistics, View};
use serde_json::json;
use std::fmt::Write as _;

/// Output format of the `analyze` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

pub fn render(view: &View<'_>, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(view)),
        ReportFormat::Json => render_json(view),
    }
}

pub fn render_text(view: &View<'_>) -> String {
    let mut out = String::new();
    match view {
        View::Messages(records) => {
            for record in records {
                let _ = writeln!(out, "{}", record.raw_line);
            }
        }
        View::Unique(rows) => write_unique(&mut out, rows),
        View::Timeline(buckets) => write_timeline(&mut out, buckets),
        View::Frequency(rows) => write_frequency(&mut out, rows),
        View::Stats(stats) => write_statistics(&mut out, stats),
    }
    out
}

fn write_unique(out: &mut String, rows: &[IdSummary]) {
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:<4} {:<4} {:>12} {:>12}",
        "CAN ID", "Count", "Dir", "DLC", "First", "Last"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<12} {:>8} {:<4} {:<4} {:>12} {:>12}",
            row.can_id, row.count, row.direction, row.dlc, row.first_time, row.last_time
        );
    }
}

fn write_timeline(out: &mut String, buckets: &[TimelineBucket]) {
    let _ = writeln!(
        out,
        "{:<25} {:>8} {:>6} {:>8} {:>8}",
        "Time Range", "Count", "IDs", "RX", "TX"
    );
    for bucket in buckets {
        let range = format!("{} - {}", bucket.start, bucket.end);
        let _ = writeln!(
            out,
            "{:<25} {:>8} {:>6} {:>8} {:>8}",
            range, bucket.count, bucket.unique_ids, bucket.rx_count, bucket.tx_count
        );
    }
}

fn write_frequency(out: &mut String, rows: &[FrequencyRow]) {
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:>9} {:>11} {:<4}",
        "CAN ID", "Count", "Percent", "Rate (Hz)", "Dir"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<12} {:>8} {:>8.2}% {:>11.2} {:<4}",
            row.can_id, row.count, row.percentage, row.rate_hz, row.direction
        );
    }
}

fn write_statistics(out: &mut String, stats: &TraceStatistics) {
    let _ = writeln!(out, "Total Messages:    {}", stats.total);
    let _ = writeln!(out, "Filtered Messages: {}", stats.filtered);
    let _ = writeln!(out, "Unique CAN IDs:    {}", stats.unique_ids);
    let _ = writeln!(out, "RX Messages:       {}", stats.rx_count);
    let _ = writeln!(out, "TX Messages:       {}", stats.tx_count);
    if let Some(duration) = stats.duration {
        let _ = writeln!(out, "Duration:          {} ms", duration);
    }
    if let Some(rate) = stats.average_rate {
        let _ = writeln!(out, "Average Rate:      {:.2} msg/s", rate);
    }
    if let Some((id, count)) = &stats.most_frequent {
        let _ = writeln!(out, "Most Frequent ID:  {} ({} messages)", id, count);
    }
}

pub fn render_json(view: &View<'_>) -> Result<String> {
    let value = match view {
        View::Messages(records) => json!({ "view": "all", "messages": records }),
        View::Unique(rows) => json!({ "view": "unique", "rows": rows }),
        View::Timeline(buckets) => json!({ "view": "timeline", "buckets": buckets }),
        View::Frequency(rows) => json!({ "view": "frequency", "rows": rows }),
        View::Stats(stats) => json!({ "view": "stats", "statistics": stats }),
    };
    serde_json::to_string_pretty(&value).context("Failed to serialize view as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_trace_decoder::{Analysis, ViewKind};

    const TRACE: &str = "InputFile: a.bin
===============================================================================
DIR TIME(msec) ID------- DLC DATA-------------------
===============================================================================
RX: 000000010  123h (2) 01 02
TX: 000000020  456h (1) FF
RX: 000000210  123h (2) 03 04

Total number of CAN messages: 3
";

    #[test]
    fn test_messages_render_raw_lines() {
        let analysis = Analysis::from_text(TRACE);
        let view = analysis.view(ViewKind::All, &analysis.select_all());
        let text = render_text(&view);
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("RX: 000000010  123h (2) 01 02\n"));
    }

    #[test]
    fn test_timeline_ranges() {
        let analysis = Analysis::from_text(TRACE);
        let view = analysis.view(ViewKind::Timeline, &analysis.select_all());
        let text = render_text(&view);
        assert!(text.contains("10 - 110"));
        assert!(text.contains("210 - 310"));
        assert!(!text.contains("110 - 210"));
    }

    #[test]
    fn test_frequency_text() {
        let analysis = Analysis::from_text(TRACE);
        let view = analysis.view(ViewKind::Frequency, &analysis.select_all());
        let text = render_text(&view);
        let first_row = text.lines().nth(1).unwrap();
        assert!(first_row.starts_with("123h"));
        assert!(first_row.contains("66.67%"));
    }

    #[test]
    fn test_statistics_text() {
        let analysis = Analysis::from_text(TRACE);
        let view = analysis.view(ViewKind::Stats, &analysis.select_all());
        let text = render_text(&view);
        assert!(text.contains("Total Messages:    3"));
        assert!(text.contains("Duration:          200 ms"));
        assert!(text.contains("Average Rate:      15.00 msg/s"));
        assert!(text.contains("Most Frequent ID:  123h (2 messages)"));
    }

    #[test]
    fn test_json_output() {
        let analysis = Analysis::from_text(TRACE);
        let view = analysis.view(ViewKind::Unique, &analysis.select_all());
        let json = render(&view, ReportFormat::Json).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["view"], "unique");
        assert_eq!(value["rows"][0]["can_id"], "123h");
        assert_eq!(value["rows"][0]["count"], 2);
        assert_eq!(value["rows"][1]["direction"], "TX");
    }
}
