//! Application configuration.

use crate::error::{AppError, AppResult};
use relay_engine::{DedupeConfig, HealthConfig, ProcessorConfig, RateLimitConfig};
use relay_venue::{RetryPolicy, VenueConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Webhook ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Listen address for the webhook server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Shared webhook token; requests are unauthenticated when absent.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Retry policy for per-venue order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (ms).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling (ms).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_venue_timeout_ms() -> u64 {
    15_000
}

/// Fan-out execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on one venue's submit, retries included (ms).
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            venue_timeout_ms: default_venue_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            venue_timeout_ms: self.venue_timeout_ms,
            retry: self.retry.policy(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Base directory for execution audit files.
    pub data_dir: String,
    /// Buffer size before flush.
    pub buffer_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/executions".to_string(),
            buffer_size: 100,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Venues orders fan out to.
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    /// Webhook ingress.
    #[serde(default)]
    pub ingress: IngressConfig,
    /// Signal deduplication.
    #[serde(default)]
    pub dedupe: DedupeConfig,
    /// Per-source rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Fan-out execution.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Venue health monitoring.
    #[serde(default)]
    pub health: HealthConfig,
    /// Execution audit persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for venue in &self.venues {
            if venue.id.trim().is_empty() {
                return Err(AppError::Config("venue id must not be empty".to_string()));
            }
            if !seen.insert(venue.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate venue id `{}`",
                    venue.id
                )));
            }
        }
        if self.execution.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "execution.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.venues.is_empty());
        assert_eq!(config.execution.retry.max_attempts, 4);
        assert_eq!(config.health.offline_threshold, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [[venues]]
            id = "hyper"
            rest_url = "https://api.example.xyz/v1"
            api_key = "k"

            [rate_limit]
            max_signals = 5
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.venues.len(), 1);
        assert_eq!(config.venues[0].id, "hyper");
        assert_eq!(config.rate_limit.max_signals, 5);
        // Omitted sections fall back to defaults.
        assert_eq!(config.execution.venue_timeout_ms, 15_000);
        assert_eq!(config.dedupe.bucket_secs, 60);
    }

    #[test]
    fn test_duplicate_venue_ids_rejected() {
        let toml_str = r#"
            [[venues]]
            id = "hyper"
            rest_url = "https://a.example"
            api_key = "k"

            [[venues]]
            id = "hyper"
            rest_url = "https://b.example"
            api_key = "k"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("bind_addr"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.ingress.bind_addr, config.ingress.bind_addr);
    }
}
