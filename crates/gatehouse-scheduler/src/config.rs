//! Scheduler configuration.

use gatehouse_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MEGABYTE: u64 = 1024 * 1024;

/// Disk thresholds and directories used by the admission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Directory artifacts are written to.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Directory holding the database files.
    #[serde(default = "default_database_dir")]
    pub database_dir: PathBuf,
    /// Triggers are refused below this much free artifact space, in MB.
    #[serde(
        default = "default_full_limit_mb",
        deserialize_with = "deserialize_megabytes"
    )]
    pub artifacts_full_limit_mb: u64,
    #[serde(
        default = "default_warning_limit_mb",
        deserialize_with = "deserialize_megabytes"
    )]
    pub artifacts_warning_limit_mb: u64,
    #[serde(
        default = "default_full_limit_mb",
        deserialize_with = "deserialize_megabytes"
    )]
    pub database_full_limit_mb: u64,
    #[serde(
        default = "default_warning_limit_mb",
        deserialize_with = "deserialize_megabytes"
    )]
    pub database_warning_limit_mb: u64,
    /// How long a disk-space sample is served before it is re-read.
    #[serde(default = "default_refresh_interval_ms")]
    pub disk_refresh_interval_ms: u64,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("/var/lib/gatehouse/artifacts")
}

fn default_database_dir() -> PathBuf {
    PathBuf::from("/var/lib/gatehouse/db")
}

fn default_full_limit_mb() -> u64 {
    100
}

fn default_warning_limit_mb() -> u64 {
    1024
}

fn default_refresh_interval_ms() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            database_dir: default_database_dir(),
            artifacts_full_limit_mb: default_full_limit_mb(),
            artifacts_warning_limit_mb: default_warning_limit_mb(),
            database_full_limit_mb: default_full_limit_mb(),
            database_warning_limit_mb: default_warning_limit_mb(),
            disk_refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Layer an optional YAML file under `GATEHOUSE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("GATEHOUSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn artifacts_full_limit_bytes(&self) -> u64 {
        self.artifacts_full_limit_mb.saturating_mul(MEGABYTE)
    }

    pub fn artifacts_warning_limit_bytes(&self) -> u64 {
        self.artifacts_warning_limit_mb.saturating_mul(MEGABYTE)
    }

    pub fn database_full_limit_bytes(&self) -> u64 {
        self.database_full_limit_mb.saturating_mul(MEGABYTE)
    }

    pub fn database_warning_limit_bytes(&self) -> u64 {
        self.database_warning_limit_mb.saturating_mul(MEGABYTE)
    }

    pub fn disk_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.disk_refresh_interval_ms)
    }
}

/// Accepts `100`, `"100"` or `"100M"`.
fn deserialize_megabytes<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => parse_megabytes(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_megabytes(text: &str) -> std::result::Result<u64, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_suffix('M')
        .or_else(|| trimmed.strip_suffix('m'))
        .unwrap_or(trimmed);
    digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size limit '{}', expected megabytes like 100M", text))
}
