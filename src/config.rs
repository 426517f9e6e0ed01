use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::output::OutputFormat;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_SPIKE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 10;

/// Settings read from `--config <file>`. Command-line flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub buffer_size: Option<usize>,
    pub format: Option<OutputFormat>,
    pub color: Option<bool>,
    pub spike_threshold: Option<f64>,
    pub rate_window_secs: Option<u64>,
    pub grok: Option<String>,
    pub json_fields: Option<bool>,
    pub alerts: Vec<AlertConfig>,
}

/// `[[alerts]]` table
#[derive(Clone, Debug, Deserialize)]
pub struct AlertConfig {
    pub name: String,
    pub pattern: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
