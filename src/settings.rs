use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::columns::ColumnMap;

const DEFAULT_ENDPOINT: &str = "https://sbtet.ap.gov.in/APSBTET/gradeWiseResults.do";
const SETTINGS_FILE: &str = "gradewise";
const ENV_PREFIX: &str = "GRADEWISE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: String,
    /// Pause after every fetch, per worker.
    pub delay_ms: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
    pub db_path: PathBuf,
    pub columns: ColumnMap,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            delay_ms: 500,
            concurrency: 1,
            max_retries: 2,
            base_backoff_ms: 1000,
            timeout_secs: 30,
            db_path: PathBuf::from("data/gradewise.sqlite"),
            columns: ColumnMap::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `gradewise.toml` if present, then `GRADEWISE_*` env vars
    /// (`GRADEWISE_COLUMNS__STATUS=7` for nested keys).
    pub fn load() -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(SETTINGS_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        self.columns.validate()
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
