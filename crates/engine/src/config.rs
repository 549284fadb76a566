//! Configuration via `keystone.toml`
//!
//! Every tunable of the store, the lease coordinator and the hierarchy
//! denormalizer lives in one TOML file. Missing sections fall back to their
//! defaults, and values are validated eagerly on load.

use keystone_core::{Error, Result};
use keystone_storage::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "keystone.toml";

/// Page size bounds for list operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when a caller does not ask for one
    pub default_page_size: usize,
    /// Upper bound applied to caller-requested page sizes
    pub max_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested page size into `1..=max_page_size`; `None` and `0`
    /// select the default
    pub fn effective_page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default_page_size,
            Some(n) => n.min(self.max_page_size),
        }
    }
}

/// Backpressure and parallelism of the hierarchy denormalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenormalizerConfig {
    /// Edges buffered between the producer and the writers
    pub channel_capacity: usize,
    /// Edges committed per batch
    pub batch_size: usize,
    /// Number of batch writer threads
    pub workers: usize,
}

impl Default for DenormalizerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            batch_size: 1000,
            workers: 4,
        }
    }
}

/// Lease defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// TTL used by callers that do not pick their own
    pub default_ttl_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
        }
    }
}

impl LeaseConfig {
    /// Default TTL as a `Duration`
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Configuration loaded from `keystone.toml`
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 3
///
/// [denormalizer]
/// channel_capacity = 1000
/// batch_size = 1000
/// workers = 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoneConfig {
    /// Conflict retry policy for read-write transactions
    pub retry: RetryConfig,
    /// List operation page sizes
    pub pagination: PaginationConfig,
    /// Hierarchy denormalizer tuning
    pub denormalizer: DenormalizerConfig,
    /// Lease defaults
    pub lease: LeaseConfig,
}

impl KeystoneConfig {
    /// Reject values that would stall or disable a component
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (
                self.pagination.default_page_size == 0,
                "pagination.default_page_size must be at least 1",
            ),
            (
                self.pagination.max_page_size < self.pagination.default_page_size,
                "pagination.max_page_size must be >= default_page_size",
            ),
            (
                self.denormalizer.channel_capacity == 0,
                "denormalizer.channel_capacity must be at least 1",
            ),
            (
                self.denormalizer.batch_size == 0,
                "denormalizer.batch_size must be at least 1",
            ),
            (
                self.denormalizer.workers == 0,
                "denormalizer.workers must be at least 1",
            ),
            (
                self.lease.default_ttl_secs == 0,
                "lease.default_ttl_secs must be at least 1",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(Error::invalid_input(*message)),
            None => self.retry.validate(),
        }
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KeystoneConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_input(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Keystone configuration

# Conflict retry for read-write transactions (exponential backoff)
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100

# Page sizes for list operations
[pagination]
default_page_size = 100
max_page_size = 1000

# Hierarchy denormalizer: bounded channel between the path walker and
# the batch writers. The walker blocks when the channel is full.
[denormalizer]
channel_capacity = 1000
batch_size = 1000
workers = 4

[lease]
default_ttl_secs = 300
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| file_error("read", path, &e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidInput(message) => {
                Error::invalid_input(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the file cannot be written.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())
                .map_err(|e| file_error("write default", path, &e))?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::query("Failed to serialize config", e))?;
        std::fs::write(path, content).map_err(|e| file_error("write", path, &e))
    }
}

/// A config path the caller supplied cannot be used
fn file_error(action: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::invalid_input(format!(
        "Failed to {} config file '{}': {}",
        action,
        path.display(),
        e
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_toml_matches_default() {
        let parsed = KeystoneConfig::from_toml_str(KeystoneConfig::default_toml()).unwrap();
        assert_eq!(parsed, KeystoneConfig::default());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = KeystoneConfig::from_toml_str("[denormalizer]\nworkers = 8\n").unwrap();
        assert_eq!(config.denormalizer.workers, 8);
        assert_eq!(config.denormalizer.batch_size, 1000);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err =
            KeystoneConfig::from_toml_str("[denormalizer]\nchannel_capacity = 0\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let err = KeystoneConfig::from_toml_str("[retry\nmax_retries = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_effective_page_size() {
        let p = PaginationConfig::default();
        assert_eq!(p.effective_page_size(None), 100);
        assert_eq!(p.effective_page_size(Some(0)), 100);
        assert_eq!(p.effective_page_size(Some(5)), 5);
        assert_eq!(p.effective_page_size(Some(50_000)), 1000);
    }

    #[test]
    fn test_write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        KeystoneConfig::write_default_if_missing(&path).unwrap();
        let config = KeystoneConfig::from_file(&path).unwrap();
        assert_eq!(config.lease.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[lease]\ndefault_ttl_secs = 7\n").unwrap();

        KeystoneConfig::write_default_if_missing(&path).unwrap();
        let config = KeystoneConfig::from_file(&path).unwrap();
        assert_eq!(config.lease.default_ttl_secs, 7);
    }

    #[test]
    fn test_write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = KeystoneConfig::default();
        config.retry.max_retries = 9;
        config.pagination.default_page_size = 25;
        config.write_to_file(&path).unwrap();
        assert_eq!(KeystoneConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let err = KeystoneConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_unwritable_path_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join(CONFIG_FILE_NAME);
        let err = KeystoneConfig::default().write_to_file(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = KeystoneConfig::write_default_if_missing(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_retry_cap_below_base_is_rejected() {
        let err = KeystoneConfig::from_toml_str("[retry]
base_delay_ms = 50
max_delay_ms = 5
")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("max_delay_ms"));
    }
}
