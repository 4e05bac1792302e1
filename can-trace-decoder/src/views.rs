//! Aggregated views over a filtered message set
//!
//! Every view is a pure projection: it takes the full record list, the
//! indices selected by the filter and (where grouping is needed) the
//! [`GroupIndex`] built once over the unfiltered records.

use crate::text::TextRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Width of a timeline bucket in time units (milliseconds)
pub const DEFAULT_BUCKET_WIDTH: i64 = 100;

/// Available projections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// Filtered messages, unchanged
    #[default]
    All,
    /// One row per CAN ID
    Unique,
    /// Fixed width time buckets
    Timeline,
    /// Per-ID share and rate
    Frequency,
    /// Summary numbers only
    Stats,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::All => write!(f, "all"),
            ViewKind::Unique => write!(f, "unique"),
            ViewKind::Timeline => write!(f, "timeline"),
            ViewKind::Frequency => write!(f, "frequency"),
            ViewKind::Stats => write!(f, "stats"),
        }
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ViewKind::All),
            "unique" => Ok(ViewKind::Unique),
            "timeline" => Ok(ViewKind::Timeline),
            "frequency" => Ok(ViewKind::Frequency),
            "stats" | "statistics" => Ok(ViewKind::Stats),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

/// Result of evaluating a view
#[derive(Debug, Clone, PartialEq)]
pub enum View<'a> {
    Messages(Vec<&'a TextRecord>),
    Unique(Vec<IdSummary>),
    Timeline(Vec<TimelineBucket>),
    Frequency(Vec<FrequencyRow>),
    Stats(TraceStatistics),
}

/// Records grouped by CAN-ID text, in order of first appearance
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    groups: Vec<(String, Vec<usize>)>,
}

impl GroupIndex {
    pub fn build(records: &[TextRecord]) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let slot = *positions.entry(record.can_id.as_str()).or_insert_with(|| {
                groups.push((record.can_id.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(index);
        }

        Self { groups }
    }

    /// Number of distinct CAN IDs
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// CAN IDs in order of first appearance with all member indices
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.groups.iter().map(|(id, members)| (id.as_str(), members.as_slice()))
    }

    /// Distinct CAN IDs sorted alphabetically
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.groups.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Groups ordered by descending total count, ties in order of first appearance
    pub fn by_frequency(&self) -> Vec<(&str, &[usize])> {
        let mut groups: Vec<_> = self.groups().collect();
        groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        groups
    }
}

/// Membership mask of a filter selection
struct Selected(Vec<bool>);

impl Selected {
    fn new(len: usize, selection: &[usize]) -> Self {
        let mut mask = vec![false; len];
        for &index in selection {
            if let Some(slot) = mask.get_mut(index) {
                *slot = true;
            }
        }
        Self(mask)
    }

    fn members<'a>(&self, records: &'a [TextRecord], group: &[usize]) -> Vec<&'a TextRecord> {
        group
            .iter()
            .filter(|&&i| self.0.get(i).copied().unwrap_or(false))
            .map(|&i| &records[i])
            .collect()
    }
}

/// Per-ID summary row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdSummary {
    pub can_id: String,
    pub count: usize,
    /// Direction of the first selected member
    pub direction: String,
    /// DLC of the first selected member
    pub dlc: String,
    pub first_time: i64,
    pub last_time: i64,
}

/// One timeline bucket `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineBucket {
    pub start: i64,
    pub end: i64,
    pub count: usize,
    pub unique_ids: usize,
    pub rx_count: usize,
    pub tx_count: usize,
}

/// Frequency analysis row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub can_id: String,
    pub count: usize,
    /// Share of the filtered set in percent
    pub percentage: f64,
    /// Messages per second over this ID's filtered time span
    pub rate_hz: f64,
    pub direction: String,
}

/// Summary numbers shown next to every view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStatistics {
    pub total: usize,
    pub filtered: usize,
    pub unique_ids: usize,
    pub rx_count: usize,
    pub tx_count: usize,
    /// `max(time) - min(time)` of the filtered set
    pub duration: Option<u64>,
    /// Filtered messages per second, only when the duration is positive
    pub average_rate: Option<f64>,
    /// Most frequent CAN ID of the full set and its count
    pub most_frequent: Option<(String, usize)>,
}

/// The filtered records, unchanged and in input order
pub fn identity<'a>(records: &'a [TextRecord], selection: &[usize]) -> Vec<&'a TextRecord> {
    selection.iter().filter_map(|&i| records.get(i)).collect()
}

/// One row per CAN ID that has selected members
pub fn id_summary(
    index: &GroupIndex,
    records: &[TextRecord],
    selection: &[usize],
) -> Vec<IdSummary> {
    let selected = Selected::new(records.len(), selection);

    index
        .groups()
        .filter_map(|(can_id, group)| {
            let members = selected.members(records, group);
            let first = members.first()?;
            Some(IdSummary {
                can_id: can_id.to_string(),
                count: members.len(),
                direction: first.direction.clone(),
                dlc: first.dlc.clone(),
                first_time: members.iter().map(|m| m.time_value).min()?,
                last_time: members.iter().map(|m| m.time_value).max()?,
            })
        })
        .collect()
}

#[derive(Default)]
struct BucketAcc<'a> {
    count: usize,
    ids: HashSet<&'a str>,
    rx: usize,
    tx: usize,
}

/// Group the selection into `width` sized buckets starting at its minimum time
///
/// Buckets without messages are omitted.
pub fn timeline(records: &[TextRecord], selection: &[usize], width: i64) -> Vec<TimelineBucket> {
    let width = width.max(1);
    let selected = identity(records, selection);
    let Some(min) = selected.iter().map(|r| r.time_value).min() else {
        return Vec::new();
    };

    let step = width.unsigned_abs();
    let mut buckets: BTreeMap<u64, BucketAcc<'_>> = BTreeMap::new();
    for record in selected {
        let slot = record.time_value.abs_diff(min) / step;
        let acc = buckets.entry(slot).or_default();
        acc.count += 1;
        acc.ids.insert(record.can_id.as_str());
        match record.direction.as_str() {
            "RX" => acc.rx += 1,
            "TX" => acc.tx += 1,
            _ => {}
        }
    }

    buckets
        .into_iter()
        .map(|(slot, acc)| {
            // slot * step never exceeds the distance from min to a member time
            let start = min.saturating_add_unsigned(slot * step);
            TimelineBucket {
                start,
                end: start.saturating_add(width),
                count: acc.count,
                unique_ids: acc.ids.len(),
                rx_count: acc.rx,
                tx_count: acc.tx,
            }
        })
        .collect()
}

/// Per-ID share of the selection, ordered by frequency in the unfiltered set
pub fn frequency(
    index: &GroupIndex,
    records: &[TextRecord],
    selection: &[usize],
) -> Vec<FrequencyRow> {
    let selected = Selected::new(records.len(), selection);
    let total = selection.len();

    index
        .by_frequency()
        .into_iter()
        .filter_map(|(can_id, group)| {
            let members = selected.members(records, group);
            let first = members.first()?;
            let min = members.iter().map(|m| m.time_value).min()?;
            let max = members.iter().map(|m| m.time_value).max()?;
            let seconds = max.abs_diff(min) as f64 / 1000.0;
            let count = members.len();

            Some(FrequencyRow {
                can_id: can_id.to_string(),
                count,
                percentage: if total > 0 {
                    count as f64 * 100.0 / total as f64
                } else {
                    0.0
                },
                rate_hz: if seconds > 0.0 {
                    count as f64 / seconds
                } else {
                    0.0
                },
                direction: first.direction.clone(),
            })
        })
        .collect()
}

/// Summary numbers of the full and the filtered set
pub fn statistics(
    index: &GroupIndex,
    records: &[TextRecord],
    selection: &[usize],
) -> TraceStatistics {
    let selected = identity(records, selection);
    let rx_count = selected.iter().filter(|r| r.direction == "RX").count();
    let tx_count = selected.iter().filter(|r| r.direction == "TX").count();

    let duration = selected
        .iter()
        .map(|r| r.time_value)
        .min()
        .zip(selected.iter().map(|r| r.time_value).max())
        .map(|(min, max)| max.abs_diff(min));
    let average_rate = duration
        .filter(|&d| d > 0)
        .map(|d| selected.len() as f64 * 1000.0 / d as f64);

    let most_frequent = index
        .by_frequency()
        .first()
        .map(|(id, members)| (id.to_string(), members.len()));

    TraceStatistics {
        total: records.len(),
        filtered: selected.len(),
        unique_ids: index.len(),
        rx_count,
        tx_count,
        duration,
        average_rate,
        most_frequent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::parse_line;

    fn records() -> Vec<TextRecord> {
        [
            "RX: 000000000  100h (1) 01",
            "TX: 000000050  200h (2) 02 03",
            "RX: 000000099  100h (1) 04",
            "RX: 000000100  300h (1) 05",
            "RX: 000000450  100h (1) 06",
            "TX: 000001000  200h (2) 07 08",
        ]
        .iter()
        .map(|l| parse_line(l).unwrap())
        .collect()
    }

    fn all(records: &[TextRecord]) -> Vec<usize> {
        (0..records.len()).collect()
    }

    #[test]
    fn test_group_index_first_seen_order() {
        let records = records();
        let index = GroupIndex::build(&records);
        let ids: Vec<&str> = index.groups().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["100h", "200h", "300h"]);
        assert_eq!(index.sorted_ids(), vec!["100h", "200h", "300h"]);
    }

    #[test]
    fn test_identity_keeps_order() {
        let records = records();
        let view = identity(&records, &[1, 4]);
        assert_eq!(view[0].can_id, "200h");
        assert_eq!(view[1].time_value, 450);
    }

    #[test]
    fn test_id_summary_restricted_to_selection() {
        let records = records();
        let index = GroupIndex::build(&records);
        let summary = id_summary(&index, &records, &[2, 3, 4]);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].can_id, "100h");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].first_time, 99);
        assert_eq!(summary[0].last_time, 450);
        assert_eq!(summary[1].can_id, "300h");
        assert_eq!(summary[1].dlc, "1");
    }

    #[test]
    fn test_timeline_buckets() {
        let records = records();
        let buckets = timeline(&records, &all(&records), DEFAULT_BUCKET_WIDTH);

        let starts: Vec<i64> = buckets.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0, 100, 400, 1000]);

        assert_eq!(buckets[0].count, 3);
        assert_eq!(buckets[0].unique_ids, 2);
        assert_eq!(buckets[0].rx_count, 2);
        assert_eq!(buckets[0].tx_count, 1);
        assert_eq!(buckets[0].end, 100);

        let total: usize = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn test_timeline_steps_from_selection_minimum() {
        let records = records();
        let buckets = timeline(&records, &[1, 3, 5], DEFAULT_BUCKET_WIDTH);
        // min = 50: [50,150) holds 50 and 100, [950,1050) holds 1000
        assert_eq!(buckets.len(), 2);
        assert_eq!((buckets[0].start, buckets[0].count), (50, 2));
        assert_eq!((buckets[1].start, buckets[1].end), (950, 1050));
    }

    #[test]
    fn test_timeline_every_record_in_its_bucket() {
        let records = records();
        let selection = all(&records);
        let buckets = timeline(&records, &selection, 30);
        for record in &records {
            let hits = buckets
                .iter()
                .filter(|b| record.time_value >= b.start && record.time_value < b.end)
                .count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn test_empty_selection() {
        let records = records();
        let index = GroupIndex::build(&records);
        assert!(timeline(&records, &[], DEFAULT_BUCKET_WIDTH).is_empty());
        assert!(frequency(&index, &records, &[]).is_empty());
        assert!(id_summary(&index, &records, &[]).is_empty());

        let stats = statistics(&index, &records, &[]);
        assert_eq!(stats.filtered, 0);
        assert_eq!(stats.duration, None);
        assert_eq!(stats.average_rate, None);
    }

    #[test]
    fn test_frequency_rows() {
        let records = records();
        let index = GroupIndex::build(&records);
        let rows = frequency(&index, &records, &all(&records));

        let ids: Vec<&str> = rows.iter().map(|r| r.can_id.as_str()).collect();
        assert_eq!(ids, vec!["100h", "200h", "300h"]);

        assert_eq!(rows[0].count, 3);
        assert!((rows[0].percentage - 50.0).abs() < 1e-9);
        // 3 messages over 0.45 s
        assert!((rows[0].rate_hz - 3.0 / 0.45).abs() < 1e-9);
        // single sample has no duration
        assert_eq!(rows[2].rate_hz, 0.0);

        let sum: usize = rows.iter().map(|r| r.count).sum();
        assert_eq!(sum, records.len());
    }

    #[test]
    fn test_frequency_order_uses_unfiltered_counts() {
        let records = records();
        let index = GroupIndex::build(&records);
        // only one 100h message selected, but 100h still leads by full-set frequency
        let rows = frequency(&index, &records, &[1, 4, 5]);
        assert_eq!(rows[0].can_id, "100h");
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[1].can_id, "200h");
        assert_eq!(rows[1].count, 2);
        assert!((rows[1].percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics() {
        let records = records();
        let index = GroupIndex::build(&records);
        let stats = statistics(&index, &records, &all(&records));

        assert_eq!(stats.total, 6);
        assert_eq!(stats.unique_ids, 3);
        assert_eq!(stats.rx_count, 4);
        assert_eq!(stats.tx_count, 2);
        assert_eq!(stats.duration, Some(1000));
        assert_eq!(stats.average_rate, Some(6.0));
        assert_eq!(stats.most_frequent, Some(("100h".to_string(), 3)));
    }

    #[test]
    fn test_extreme_times_do_not_overflow() {
        let records: Vec<TextRecord> = [
            "RX: -9000000000000000000  100h (1) 01",
            "RX: 9000000000000000000  200h (1) 02",
        ]
        .iter()
        .map(|l| parse_line(l).unwrap())
        .collect();
        let index = GroupIndex::build(&records);
        let selection = all(&records);

        let buckets = timeline(&records, &selection, DEFAULT_BUCKET_WIDTH);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start, -9_000_000_000_000_000_000);
        assert!(buckets[1].start <= 9_000_000_000_000_000_000);
        assert!(buckets[1].end > 9_000_000_000_000_000_000);

        let stats = statistics(&index, &records, &selection);
        assert_eq!(stats.duration, Some(18_000_000_000_000_000_000));
        assert!(stats.average_rate.unwrap() > 0.0);

        let rows = frequency(&index, &records, &selection);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rate_hz, 0.0);
    }

    #[test]
    fn test_timeline_end_saturates() {
        let records = vec![parse_line("RX: 9223372036854775800  100h (1) 01").unwrap()];
        let buckets = timeline(&records, &[0], DEFAULT_BUCKET_WIDTH);
        assert_eq!(buckets[0].start, 9_223_372_036_854_775_800);
        assert_eq!(buckets[0].end, i64::MAX);
    }

    #[test]
    fn test_view_kind_parsing() {
        assert_eq!("Timeline".parse::<ViewKind>().unwrap(), ViewKind::Timeline);
        assert_eq!("statistics".parse::<ViewKind>().unwrap(), ViewKind::Stats);
        assert!("bogus".parse::<ViewKind>().is_err());
        assert_eq!(ViewKind::Frequency.to_string(), "frequency");
    }
}
