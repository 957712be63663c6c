//! Configuration management for Kafka Viewer
//!
//! This module handles loading, parsing, and validating configuration
//! from files, environment variables, and command-line arguments.
//!
//! Precedence, lowest first: built-in defaults, the YAML file,
//! `KAFKA_VIEWER_*` environment variables, CLI flags.

use crate::consumer::settings::{ClusterLookup, ClusterSettings, ConsumerSettings};
use crate::consumer::OffsetPolicy;
use crate::error::{Result, ViewerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Cluster id used when `KAFKA_VIEWER_BOOTSTRAP` is set without `KAFKA_VIEWER_CLUSTER_ID`
pub const DEFAULT_ENV_CLUSTER_ID: &str = "local";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Clusters sessions can connect to
    #[serde(default)]
    pub clusters: Vec<ClusterSettings>,

    /// Defaults shared by every viewer session
    #[serde(default)]
    pub consumer: ConsumerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, STDERR only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment overrides
    ///
    /// A missing file is not an error: defaults are used and a warning
    /// is logged.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        Ok(config)
    }

    /// Load configuration and apply CLI overrides on top
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load_with_cli(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_cli_overrides(cli);
        Ok(config)
    }

    /// Parse configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ViewerError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ViewerError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(offset) = std::env::var("KAFKA_VIEWER_DEFAULT_OFFSET") {
            match offset.parse::<OffsetPolicy>() {
                Ok(policy) => {
                    self.consumer.default_offset = policy;
                    tracing::debug!(default_offset = %policy, "Env override: KAFKA_VIEWER_DEFAULT_OFFSET");
                }
                Err(_) => tracing::warn!("Invalid KAFKA_VIEWER_DEFAULT_OFFSET: {}", offset),
            }
        }

        if let Ok(retries) = std::env::var("KAFKA_VIEWER_RETRIES") {
            match retries.parse::<u32>() {
                Ok(v) => self.consumer.retries = v,
                Err(_) => tracing::warn!("Invalid KAFKA_VIEWER_RETRIES: {}", retries),
            }
        }

        if let Ok(timeout) = std::env::var("KAFKA_VIEWER_SESSION_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(v) => self.consumer.session_timeout_ms = v,
                Err(_) => tracing::warn!("Invalid KAFKA_VIEWER_SESSION_TIMEOUT_MS: {}", timeout),
            }
        }

        if let Ok(delay) = std::env::var("KAFKA_VIEWER_SETTLE_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(v) => self.consumer.settle_delay_ms = v,
                Err(_) => tracing::warn!("Invalid KAFKA_VIEWER_SETTLE_DELAY_MS: {}", delay),
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("KAFKA_VIEWER_LOG_LEVEL") {
            tracing::debug!(level = %level, "Env override: KAFKA_VIEWER_LOG_LEVEL");
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("KAFKA_VIEWER_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => {
                    tracing::warn!("Invalid value for KAFKA_VIEWER_JSON_LOGS: {}", json_logs);
                }
            }
        }

        if let Ok(log_file) = std::env::var("KAFKA_VIEWER_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(log_file));
        }

        // Single cluster from the environment, added or replaced by id
        if let Ok(bootstrap) = std::env::var("KAFKA_VIEWER_BOOTSTRAP") {
            let id = std::env::var("KAFKA_VIEWER_CLUSTER_ID")
                .unwrap_or_else(|_| DEFAULT_ENV_CLUSTER_ID.to_string());
            let cluster = ClusterSettings::new(&id, &bootstrap);
            match self.clusters.iter_mut().find(|c| c.id == id) {
                Some(existing) => {
                    existing.bootstrap = bootstrap;
                    tracing::debug!(cluster_id = %id, "Overrode cluster bootstrap from KAFKA_VIEWER_BOOTSTRAP");
                }
                None => {
                    self.clusters.push(cluster);
                    tracing::debug!(cluster_id = %id, "Added cluster from KAFKA_VIEWER_BOOTSTRAP");
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error on empty or duplicate cluster ids, empty bootstrap
    /// lists, SASL blocks without username, zero timeouts, or a numeric
    /// default offset
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if cluster.id.trim().is_empty() {
                return Err(ViewerError::Config("Cluster id cannot be empty".to_string()).into());
            }
            if !seen.insert(cluster.id.as_str()) {
                return Err(
                    ViewerError::Config(format!("Duplicate cluster id: {}", cluster.id)).into(),
                );
            }
            if cluster.bootstrap.trim().is_empty() {
                return Err(ViewerError::Config(format!(
                    "Cluster {} has no bootstrap servers",
                    cluster.id
                ))
                .into());
            }
            if let Some(sasl) = &cluster.sasl {
                if sasl.username.trim().is_empty() {
                    return Err(ViewerError::Config(format!(
                        "Cluster {} has SASL enabled without a username",
                        cluster.id
                    ))
                    .into());
                }
            }
        }

        if self.consumer.session_timeout_ms == 0 {
            return Err(ViewerError::Config(
                "consumer.session_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.consumer.metadata_timeout_ms == 0 {
            return Err(ViewerError::Config(
                "consumer.metadata_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if let OffsetPolicy::Offset(offset) = self.consumer.default_offset {
            return Err(ViewerError::Config(format!(
                "consumer.default_offset must be a policy keyword, not offset {}",
                offset
            ))
            .into());
        }

        Ok(())
    }
}

impl ClusterLookup for Config {
    fn cluster(&self, cluster_id: &str) -> Option<ClusterSettings> {
        self.clusters.iter().find(|c| c.id == cluster_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::settings::SaslMechanism;
    use serial_test::serial;

    const SAMPLE: &str = r#"
clusters:
  - id: clusterA
    name: Local cluster
    bootstrap: localhost:9092
  - id: secure
    bootstrap: kafka:9093
    sasl:
      mechanism: scram-sha-256
      username: viewer
      password: secret
    ssl:
      ca_location: /etc/ca.pem
consumer:
  default_offset: earliest
  settle_delay_ms: 50
logging:
  level: debug
  json_format: true
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.clusters.is_empty());
        assert_eq!(config.consumer.default_offset, OffsetPolicy::Latest);
        assert_eq!(config.consumer.retries, 3);
        assert_eq!(config.consumer.settle_delay_ms, 200);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.consumer.default_offset, OffsetPolicy::Earliest);
        assert_eq!(config.consumer.settle_delay_ms, 50);
        assert_eq!(config.consumer.session_timeout_ms, 30_000);
        assert!(config.logging.json_format);

        let secure = config.cluster("secure").unwrap();
        assert_eq!(secure.sasl.unwrap().mechanism, SaslMechanism::ScramSha256);
        assert!(config.cluster("missing").is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_duplicate_cluster() {
        let mut config = Config::default();
        config.clusters.push(ClusterSettings::new("a", "h:1"));
        config.clusters.push(ClusterSettings::new("a", "h:2"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate cluster id"));
    }

    #[test]
    fn test_config_validation_empty_bootstrap() {
        let mut config = Config::default();
        config.clusters.push(ClusterSettings::new("a", " "));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_sasl_without_username() {
        let mut config = Config::default();
        config
            .clusters
            .push(ClusterSettings::new("a", "h:1").with_sasl(SaslMechanism::Plain, "", "p"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.consumer.session_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_numeric_default_offset() {
        let mut config = Config::default();
        config.consumer.default_offset = OffsetPolicy::Offset(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_invalid_yaml() {
        assert!(Config::from_yaml("clusters: [").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("KAFKA_VIEWER_DEFAULT_OFFSET", "earliest");
        std::env::set_var("KAFKA_VIEWER_RETRIES", "7");
        std::env::set_var("KAFKA_VIEWER_JSON_LOGS", "not-a-bool");
        std::env::set_var("KAFKA_VIEWER_BOOTSTRAP", "broker:9092");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("KAFKA_VIEWER_DEFAULT_OFFSET");
        std::env::remove_var("KAFKA_VIEWER_RETRIES");
        std::env::remove_var("KAFKA_VIEWER_JSON_LOGS");
        std::env::remove_var("KAFKA_VIEWER_BOOTSTRAP");

        assert_eq!(config.consumer.default_offset, OffsetPolicy::Earliest);
        assert_eq!(config.consumer.retries, 7);
        assert!(!config.logging.json_format);
        let local = config.cluster(DEFAULT_ENV_CLUSTER_ID).unwrap();
        assert_eq!(local.bootstrap, "broker:9092");
    }

    #[test]
    #[serial]
    fn test_env_bootstrap_replaces_existing_cluster() {
        std::env::set_var("KAFKA_VIEWER_BOOTSTRAP", "other:9092");
        std::env::set_var("KAFKA_VIEWER_CLUSTER_ID", "clusterA");

        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.apply_env_vars();

        std::env::remove_var("KAFKA_VIEWER_BOOTSTRAP");
        std::env::remove_var("KAFKA_VIEWER_CLUSTER_ID");

        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.cluster("clusterA").unwrap().bootstrap, "other:9092");
    }
}
