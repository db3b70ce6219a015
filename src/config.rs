//! Environment-based worker configuration.
//!
//! The worker is pointed at its histogram output and load shape
//! entirely through environment variables, so the same binary can be
//! dropped into any orchestration without a CLI surface.

use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_CONCURRENCY: u32 = 10;
const DEFAULT_DURATION_SECS: u64 = 30;
const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 100;
const DEFAULT_PAYLOAD_BYTES: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Worker configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the shutdown `.hist` file. Unset disables
    /// histogram persistence entirely.
    pub histogram_dir: Option<PathBuf>,

    /// Object-storage bucket the `.hist` file is uploaded to after
    /// it has been written and synced. Unset disables upload.
    pub histogram_bucket: Option<String>,

    /// Number of concurrent load worker tasks.
    pub concurrency: u32,

    /// How long the load runs, in seconds.
    pub duration_secs: u64,

    /// Delay between publishes on each worker's channel.
    pub publish_interval_ms: u64,

    /// Size of each randomly generated message payload.
    pub payload_bytes: usize,
}

impl Config {
    /// Resolves configuration through the supplied environment lookup
    /// (normally `std::env::var(..).ok()`); injectable for tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            histogram_dir: lookup("PERF_HISTOGRAM_DIR").map(PathBuf::from),
            histogram_bucket: lookup("PERF_HISTOGRAM_S3_BUCKET"),
            concurrency: parse_or(&lookup, "LOAD_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            duration_secs: parse_or(&lookup, "LOAD_DURATION_SECS", DEFAULT_DURATION_SECS)?,
            publish_interval_ms: parse_or(
                &lookup,
                "LOAD_PUBLISH_INTERVAL_MS",
                DEFAULT_PUBLISH_INTERVAL_MS,
            )?,
            payload_bytes: parse_or(&lookup, "LOAD_PAYLOAD_BYTES", DEFAULT_PAYLOAD_BYTES)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 || self.concurrency > 500 {
            return Err(ConfigError::Invalid(
                "LOAD_CONCURRENCY must be between 1 and 500".into(),
            ));
        }
        if self.duration_secs == 0 || self.duration_secs > 3_600 {
            return Err(ConfigError::Invalid(
                "LOAD_DURATION_SECS must be between 1 and 3600".into(),
            ));
        }
        if self.publish_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "LOAD_PUBLISH_INTERVAL_MS must be at least 1".into(),
            ));
        }
        if self.payload_bytes == 0 || self.payload_bytes > 65_536 {
            return Err(ConfigError::Invalid(
                "LOAD_PAYLOAD_BYTES must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key} has unparseable value '{raw}'"))),
    }
}
