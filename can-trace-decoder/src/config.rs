//! Decoder configuration types
//!
//! This module defines the options of a single conversion request. Everything
//! that is not a pure data option (progress channel, cancellation) is passed
//! to the decode call directly.

use serde::{Deserialize, Serialize};

/// Default number of records between two progress notifications
pub const DEFAULT_PROGRESS_INTERVAL: usize = 500;

/// Configuration for one conversion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Print timestamps as delta to the previous message
    #[serde(default)]
    pub differential: bool,

    /// Records between two progress notifications
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            differential: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable differential timestamps
    pub fn with_differential(mut self, enabled: bool) -> Self {
        self.differential = enabled;
        self
    }

    /// Builder method: set the progress notification interval (0 disables periodic ticks)
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Check if a progress notification is due after `count` records
    pub fn is_progress_tick(&self, count: usize) -> bool {
        self.progress_interval != 0 && count % self.progress_interval == 0
    }
}
