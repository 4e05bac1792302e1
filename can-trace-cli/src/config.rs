//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_trace_decoder::views::DEFAULT_BUCKET_WIDTH;
use can_trace_decoder::{FilterCriteria, FixedSliceSourceId, ViewKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub filter: FilterCriteria,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub view: ViewKind,
    #[serde(default = "default_bucket_width")]
    pub bucket_width: i64,
    /// Print differential timestamps when decoding binary input
    #[serde(default)]
    pub differential: bool,
    /// Where the source id sits inside the CAN-ID text
    #[serde(default)]
    pub source_id: FixedSliceSourceId,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            view: ViewKind::default(),
            bucket_width: default_bucket_width(),
            differential: false,
            source_id: FixedSliceSourceId::default(),
        }
    }
}

fn default_bucket_width() -> i64 {
    DEFAULT_BUCKET_WIDTH
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.analysis.bucket_width <= 0 {
        anyhow::bail!(
            "Invalid bucket_width {} in {:?}, must be positive",
            config.analysis.bucket_width,
            path
        );
    }
    config
        .filter
        .validate()
        .with_context(|| format!("Invalid [filter] section in {:?}", path))?;

    Ok(config)
}
