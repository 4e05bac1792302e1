//! Compound message filter
//!
//! [`FilterCriteria`] holds independent optional predicates. A record passes
//! when every predicate that is set matches; unset predicates always match.
//! Filtering never reorders records.

use crate::text::TextRecord;
use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};

/// Extracts the node/source id part of a CAN-ID column
///
/// The meaning of the bits differs between higher layer protocols, so the
/// extraction is pluggable.
pub trait SourceIdExtractor {
    fn source_id<'a>(&self, can_id: &'a str) -> &'a str;
}

/// Takes a fixed character slice of the CAN-ID text
///
/// The default slice is two characters at offset 2. IDs shorter than
/// `offset + len` characters yield an empty source id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedSliceSourceId {
    pub offset: usize,
    pub len: usize,
}

impl Default for FixedSliceSourceId {
    fn default() -> Self {
        Self { offset: 2, len: 2 }
    }
}

impl SourceIdExtractor for FixedSliceSourceId {
    fn source_id<'a>(&self, can_id: &'a str) -> &'a str {
        can_id
            .get(self.offset..self.offset + self.len)
            .unwrap_or("")
    }
}

/// Match on one byte of the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    /// Index into the parsed data bytes
    pub byte_index: usize,
    /// Substring of the two digit hex rendering of that byte
    pub pattern: String,
}

/// Filter predicates, all optional and AND-combined
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Exact direction (`RX` / `TX`)
    pub direction: Option<String>,
    /// Case-insensitive substring of the CAN-ID column
    pub can_id: Option<String>,
    /// Exact DLC text
    pub dlc: Option<String>,
    /// Inclusive lower time bound
    pub time_from: Option<i64>,
    /// Inclusive upper time bound
    pub time_to: Option<i64>,
    /// Case-insensitive substring of the data column
    pub data: Option<String>,
    /// Case-insensitive substring of the source id
    pub source_id: Option<String>,
    pub function_code: Option<FunctionCode>,
}

impl FilterCriteria {
    /// Create criteria that accept every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: require a direction
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    /// Builder method: require a CAN-ID substring
    pub fn with_can_id(mut self, pattern: impl Into<String>) -> Self {
        self.can_id = Some(pattern.into());
        self
    }

    /// Builder method: require a DLC
    pub fn with_dlc(mut self, dlc: impl Into<String>) -> Self {
        self.dlc = Some(dlc.into());
        self
    }

    /// Builder method: set the time window (either bound may be open)
    pub fn with_time_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.time_from = from;
        self.time_to = to;
        self
    }

    /// Builder method: require a data substring
    pub fn with_data(mut self, pattern: impl Into<String>) -> Self {
        self.data = Some(pattern.into());
        self
    }

    /// Builder method: require a source id substring
    pub fn with_source_id(mut self, pattern: impl Into<String>) -> Self {
        self.source_id = Some(pattern.into());
        self
    }

    /// Builder method: require a function code byte
    pub fn with_function_code(mut self, byte_index: usize, pattern: impl Into<String>) -> Self {
        self.function_code = Some(FunctionCode {
            byte_index,
            pattern: pattern.into(),
        });
        self
    }

    /// Check if no predicate is set
    pub fn is_empty(&self) -> bool {
        self.compile(&FixedSliceSourceId::default()).predicates.is_empty()
    }

    /// Reject a function code index outside the 8 byte payload
    ///
    /// An inverted time range is accepted and simply matches nothing.
    pub fn validate(&self) -> Result<()> {
        if let Some(fc) = &self.function_code {
            if fc.byte_index >= 8 {
                return Err(DecoderError::InvalidCriteria(format!(
                    "function code byte index {} out of range 0..8",
                    fc.byte_index
                )));
            }
        }
        Ok(())
    }

    fn compile<'s>(&'s self, source: &'s dyn SourceIdExtractor) -> CompiledFilter<'s> {
        let mut predicates = Vec::new();

        if let Some(direction) = non_blank(&self.direction) {
            predicates.push(Predicate::Direction(direction));
        }
        if let Some(pattern) = non_blank(&self.can_id) {
            predicates.push(Predicate::CanId(pattern.to_uppercase()));
        }
        if let Some(dlc) = non_blank(&self.dlc) {
            predicates.push(Predicate::Dlc(dlc));
        }
        if let Some(from) = self.time_from {
            predicates.push(Predicate::TimeFrom(from));
        }
        if let Some(to) = self.time_to {
            predicates.push(Predicate::TimeTo(to));
        }
        if let Some(pattern) = non_blank(&self.data) {
            predicates.push(Predicate::Data(pattern.to_uppercase()));
        }
        if let Some(pattern) = non_blank(&self.source_id) {
            predicates.push(Predicate::SourceId(pattern.to_uppercase()));
        }
        if let Some(fc) = &self.function_code {
            let pattern = fc.pattern.trim();
            if !pattern.is_empty() {
                predicates.push(Predicate::FunctionCode(fc.byte_index, pattern.to_uppercase()));
            }
        }

        CompiledFilter { predicates, source }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Single predicate with its pattern already normalised
#[derive(Debug)]
enum Predicate<'a> {
    Direction(&'a str),
    CanId(String),
    Dlc(&'a str),
    TimeFrom(i64),
    TimeTo(i64),
    Data(String),
    SourceId(String),
    FunctionCode(usize, String),
}

struct CompiledFilter<'a> {
    predicates: Vec<Predicate<'a>>,
    source: &'a dyn SourceIdExtractor,
}

impl CompiledFilter<'_> {
    fn matches(&self, record: &TextRecord) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::Direction(d) => record.direction == *d,
            Predicate::CanId(pattern) => record.can_id.to_uppercase().contains(pattern.as_str()),
            Predicate::Dlc(dlc) => record.dlc == *dlc,
            Predicate::TimeFrom(from) => record.time_value >= *from,
            Predicate::TimeTo(to) => record.time_value <= *to,
            Predicate::Data(pattern) => record.data.to_uppercase().contains(pattern.as_str()),
            Predicate::SourceId(pattern) => self
                .source
                .source_id(&record.can_id)
                .to_uppercase()
                .contains(pattern.as_str()),
            Predicate::FunctionCode(index, pattern) => record
                .data_bytes
                .get(*index)
                .is_some_and(|b| format!("{:02X}", b).contains(pattern.as_str())),
        })
    }
}

/// Indices of the records matching `criteria`, in input order
pub fn apply(records: &[TextRecord], criteria: &FilterCriteria) -> Vec<usize> {
    apply_with(records, criteria, &FixedSliceSourceId::default())
}

/// Like [`apply`] with a custom source id extraction
pub fn apply_with(
    records: &[TextRecord],
    criteria: &FilterCriteria,
    source: &dyn SourceIdExtractor,
) -> Vec<usize> {
    let filter = criteria.compile(source);
    log::debug!("Applying {} filter predicates", filter.predicates.len());

    records
        .iter()
        .enumerate()
        .filter(|(_, record)| filter.matches(record))
        .map(|(index, _)| index)
        .collect()
}
