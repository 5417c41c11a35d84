//! Node configuration
//!
//! Loaded from TOML, overridden from `HUB_*` environment variables and
//! validated before the engine starts. Every field has a default so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{HubError, HubResult};
use crate::message::Network;

/// Upper bound on an explicitly configured worker count
pub const MAX_VALIDATION_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// Network this node admits messages for
    pub network: Network,
    pub validation: ValidationConfig,
    pub rate_limit: RateLimitConfig,
    pub revocation: RevocationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Worker count; `None` sizes the pool from the CPU count, `Some(0)`
    /// validates on the calling task
    pub workers: Option<usize>,
    /// Round-trip bound for a single worker job
    pub worker_timeout_ms: u64,
    /// Refuse to start when the worker pool cannot be created
    pub require_worker_pool: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            workers: None,
            worker_timeout_ms: 5_000,
            require_worker_pool: false,
        }
    }
}

impl ValidationConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// Pool size: explicit count, else `clamp(cpus - 1, 1, 4)`
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(count) => count,
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                default_worker_count(cpus)
            }
        }
    }
}

/// `clamp(cpus - 1, 1, 4)`
pub fn default_worker_count(cpus: usize) -> usize {
    cpus.saturating_sub(1).clamp(1, 4)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 24 * 60 * 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Delay before revoking messages signed under a transferred custody address
    pub transfer_grace_secs: u64,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            transfer_grace_secs: 60 * 60,
        }
    }
}

impl HubConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> HubResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubError::invalid_param(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), network = %config.network, "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> HubResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Merge with `HUB_*` environment variables
    pub fn merge_with_env(&mut self) -> HubResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from an iterator of `(name, value)` pairs
    pub fn merge_with_vars<I>(&mut self, vars: I) -> HubResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "HUB_NETWORK" => self.network = value.parse()?,
                "HUB_VALIDATION_WORKERS" => {
                    self.validation.workers = Some(parse_env(&key, &value)?);
                }
                "HUB_WORKER_TIMEOUT_MS" => {
                    self.validation.worker_timeout_ms = parse_env(&key, &value)?;
                }
                "HUB_RATE_LIMIT_ENABLED" => self.rate_limit.enabled = parse_env(&key, &value)?,
                "HUB_RATE_LIMIT_WINDOW_SECS" => {
                    self.rate_limit.window_secs = parse_env(&key, &value)?;
                }
                "HUB_TRANSFER_GRACE_SECS" => {
                    self.revocation.transfer_grace_secs = parse_env(&key, &value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> HubResult<()> {
        if self.validation.worker_timeout_ms == 0 {
            return Err(HubError::invalid_param(
                "validation.worker_timeout_ms must be positive",
            ));
        }
        if let Some(workers) = self.validation.workers {
            if workers > MAX_VALIDATION_WORKERS {
                return Err(HubError::invalid_param(format!(
                    "validation.workers must be at most {MAX_VALIDATION_WORKERS}, got {workers}"
                )));
            }
        }
        if self.rate_limit.window_secs == 0 {
            return Err(HubError::invalid_param(
                "rate_limit.window_secs must be positive",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> HubResult<T> {
    value
        .parse()
        .map_err(|_| HubError::invalid_param(format!("invalid value for {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = HubConfig::from_toml_str("").unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.revocation.transfer_grace_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network = \"mainnet\"\n[validation]\nworkers = 2\nworker_timeout_ms = 250\n[rate_limit]\nenabled = false"
        )
        .unwrap();

        let config = HubConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.validation.workers, Some(2));
        assert_eq!(config.validation.worker_timeout_ms, 250);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window_secs, 86_400);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = HubConfig::default();
        config
            .merge_with_vars(vec![
                ("HUB_NETWORK".to_string(), "testnet".to_string()),
                ("HUB_VALIDATION_WORKERS".to_string(), "0".to_string()),
                ("HUB_TRANSFER_GRACE_SECS".to_string(), "60".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.validation.workers, Some(0));
        assert_eq!(config.revocation.transfer_grace_secs, 60);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let mut config = HubConfig::default();
        let err = config
            .merge_with_vars(vec![(
                "HUB_WORKER_TIMEOUT_MS".to_string(),
                "soon".to_string(),
            )])
            .unwrap_err();
        assert_eq!(err.code, crate::HubErrorCode::InvalidParam);
    }

    #[test]
    fn validate_rejects_zero_timeout_and_huge_pool() {
        let mut config = HubConfig::default();
        config.validation.worker_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.validation.workers = Some(MAX_VALIDATION_WORKERS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_pool_size_is_clamped() {
        assert_eq!(default_worker_count(1), 1);
        assert_eq!(default_worker_count(2), 1);
        assert_eq!(default_worker_count(4), 3);
        assert_eq!(default_worker_count(32), 4);
    }
}
