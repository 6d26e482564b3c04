//! Ingestion configuration
//!
//! Everything is read from `NUMPORT_*` environment variables with the
//! defaults below. Call [`IngestConfig::validate`] before use; loaders assume
//! a non-zero chunk size and a safe staging table identifier.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Pipeline Defaults
// ============================================================================

/// Lines per chunk file.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// Where chunk files are materialised.
pub const DEFAULT_CHUNK_DIR: &str = "/tmp/numport_chunks";

/// Decompressed export consumed by `import` when no path is given.
pub const DEFAULT_SOURCE_FILE: &str = "/tmp/export_full_mysql.csv";

/// Rows per commit in the fallback loader.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Run `VACUUM ANALYZE` after this many chunks. Zero disables it.
pub const DEFAULT_MAINTENANCE_EVERY: u64 = 10;

/// Row count of the published full export.
pub const DEFAULT_EXPECTED_TOTAL: u64 = 51_618_684;

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// A heartbeat older than this means no import is running.
pub const DEFAULT_HEARTBEAT_STALE_AFTER_SECS: u64 = 30;

/// Extra bulk attempts per chunk before falling back.
pub const DEFAULT_BULK_RETRIES: u32 = 1;

pub const DEFAULT_STAGING_TABLE: &str = "portability_staging";

/// How long a reset waits for a cancelled import to wind down.
pub const DEFAULT_RESET_WAIT_SECS: u64 = 30;

// ============================================================================
// Fetch Defaults
// ============================================================================

pub const DEFAULT_FETCH_BASE_URL: &str = "https://techsuper.com.br/baseportabilidade/";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_FETCH_MAX_RETRIES: u32 = 3;
pub const DEFAULT_FETCH_RETRY_DELAY_SECS: u64 = 2;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub source_file: PathBuf,
    pub chunk_dir: PathBuf,
    pub chunk_size: u64,
    pub batch_size: usize,
    pub maintenance_every: u64,
    pub expected_total: u64,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_stale_after_secs: u64,
    pub bulk_retries: u32,
    pub staging_table: String,
    /// Staging tables left behind by older loader variants; dropped on reset.
    pub extra_staging_tables: Vec<String>,
    pub reset_wait_secs: u64,
    pub fetch: FetchConfig,
}

/// Download settings for the published dataset files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub download_dir: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FETCH_BASE_URL.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_retries: DEFAULT_FETCH_MAX_RETRIES,
            retry_delay_secs: DEFAULT_FETCH_RETRY_DELAY_SECS,
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_or("NUMPORT_FETCH_BASE_URL", DEFAULT_FETCH_BASE_URL.to_string()),
            download_dir: env_or("NUMPORT_DOWNLOAD_DIR", PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            timeout_secs: env_or("NUMPORT_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT_SECS),
            max_retries: env_or("NUMPORT_FETCH_MAX_RETRIES", DEFAULT_FETCH_MAX_RETRIES),
            retry_delay_secs: env_or("NUMPORT_FETCH_RETRY_DELAY", DEFAULT_FETCH_RETRY_DELAY_SECS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(IngestError::config(format!(
                "fetch base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.max_retries == 0 {
            return Err(IngestError::config("fetch max_retries must be at least 1"));
        }
        Ok(())
    }

    /// Join a file name onto the base URL.
    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), filename)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_file: PathBuf::from(DEFAULT_SOURCE_FILE),
            chunk_dir: PathBuf::from(DEFAULT_CHUNK_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            maintenance_every: DEFAULT_MAINTENANCE_EVERY,
            expected_total: DEFAULT_EXPECTED_TOTAL,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_stale_after_secs: DEFAULT_HEARTBEAT_STALE_AFTER_SECS,
            bulk_retries: DEFAULT_BULK_RETRIES,
            staging_table: DEFAULT_STAGING_TABLE.to_string(),
            extra_staging_tables: vec![
                "staging_portabilidade".to_string(),
                "temp_import".to_string(),
            ],
            reset_wait_secs: DEFAULT_RESET_WAIT_SECS,
            fetch: FetchConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from the environment (after `.env`) and validate it.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            source_file: env_or("NUMPORT_SOURCE_FILE", defaults.source_file),
            chunk_dir: env_or("NUMPORT_CHUNK_DIR", defaults.chunk_dir),
            chunk_size: env_or("NUMPORT_CHUNK_SIZE", defaults.chunk_size),
            batch_size: env_or("NUMPORT_BATCH_SIZE", defaults.batch_size),
            maintenance_every: env_or("NUMPORT_MAINTENANCE_EVERY", defaults.maintenance_every),
            expected_total: env_or("NUMPORT_EXPECTED_TOTAL", defaults.expected_total),
            heartbeat_interval_secs: env_or(
                "NUMPORT_HEARTBEAT_INTERVAL",
                defaults.heartbeat_interval_secs,
            ),
            heartbeat_stale_after_secs: env_or(
                "NUMPORT_HEARTBEAT_STALE_AFTER",
                defaults.heartbeat_stale_after_secs,
            ),
            bulk_retries: env_or("NUMPORT_BULK_RETRIES", defaults.bulk_retries),
            staging_table: env_or("NUMPORT_STAGING_TABLE", defaults.staging_table),
            extra_staging_tables: std::env::var("NUMPORT_EXTRA_STAGING_TABLES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.extra_staging_tables),
            reset_wait_secs: env_or("NUMPORT_RESET_WAIT", defaults.reset_wait_secs),
            fetch: FetchConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IngestError::config("chunk_size must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(IngestError::config("batch_size must be greater than 0"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(IngestError::config("heartbeat interval must be greater than 0"));
        }
        if self.heartbeat_stale_after_secs <= self.heartbeat_interval_secs {
            return Err(IngestError::config(format!(
                "heartbeat stale threshold ({}s) must exceed the heartbeat interval ({}s)",
                self.heartbeat_stale_after_secs, self.heartbeat_interval_secs
            )));
        }
        validate_identifier(&self.staging_table)?;
        for table in &self.extra_staging_tables {
            validate_identifier(table)?;
        }
        self.fetch.validate()?;

        if self.expected_total == 0 {
            tracing::warn!("expected_total is 0; progress will always report complete");
        }

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_stale_after(&self) -> Duration {
        Duration::from_secs(self.heartbeat_stale_after_secs)
    }

    /// Every staging table a reset should drop, configured one first.
    pub fn all_staging_tables(&self) -> Vec<&str> {
        std::iter::once(self.staging_table.as_str())
            .chain(self.extra_staging_tables.iter().map(String::as_str))
            .collect()
    }
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start
        || name.len() > 63
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(IngestError::config(format!("invalid table identifier: '{}'", name)));
    }

    Ok(())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
                default
            },
        },
        Err(_) => default,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 1_000_000);
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.maintenance_every, 10);
        assert_eq!(
            config.all_staging_tables(),
            vec!["portability_staging", "staging_portabilidade", "temp_import"]
        );
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = IngestConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stale_threshold_must_exceed_interval() {
        let config = IngestConfig {
            heartbeat_interval_secs: 10,
            heartbeat_stale_after_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("portability_staging").is_ok());
        assert!(validate_identifier("_tmp1").is_ok());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("staging; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_fetch_url_join() {
        let fetch = FetchConfig {
            base_url: "https://example.org/data/".to_string(),
            ..Default::default()
        };
        assert_eq!(fetch.url_for("a.sql"), "https://example.org/data/a.sql");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("NUMPORT_CHUNK_SIZE", "250");
        std::env::set_var("NUMPORT_CHUNK_DIR", "/var/tmp/chunks");
        std::env::set_var("NUMPORT_BATCH_SIZE", "not-a-number");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.chunk_dir, PathBuf::from("/var/tmp/chunks"));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);

        std::env::remove_var("NUMPORT_CHUNK_SIZE");
        std::env::remove_var("NUMPORT_CHUNK_DIR");
        std::env::remove_var("NUMPORT_BATCH_SIZE");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_staging_name() {
        std::env::set_var("NUMPORT_STAGING_TABLE", "bad name");
        assert!(IngestConfig::from_env().is_err());
        std::env::remove_var("NUMPORT_STAGING_TABLE");
    }
}
