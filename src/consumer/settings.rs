//! Cluster connection settings and resolved session options.
//!
//! [`ClusterSettings`] describe how to reach one configured cluster.
//! [`ConsumerOptions`] combine a decoded [`ConsumerIdentity`] with the
//! settings of its cluster and the configured consumer defaults; building
//! them is the step that fails for unknown clusters and malformed partition
//! expressions.
//!
//! # Example
//!
//! ```rust
//! use kafka_viewer::consumer::settings::{ClusterSettings, SecurityProtocol};
//!
//! let cluster = ClusterSettings::new("local", "localhost:9092")
//!     .with_sasl_scram_sha256("user", "pass")
//!     .with_ssl("/path/to/ca.pem");
//! assert_eq!(cluster.security_protocol(), SecurityProtocol::SaslSsl);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use super::assignment::AssignmentStrategy;
use super::error::ConsumerError;
use super::locator::{ConsumerIdentity, OffsetPolicy};
use super::partitions::parse_partitions;

/// Security protocol for Kafka connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    /// No encryption or authentication.
    #[default]
    Plaintext,
    /// TLS encryption without SASL.
    Ssl,
    /// SASL authentication without TLS.
    SaslPlaintext,
    /// SASL authentication with TLS encryption.
    SaslSsl,
}

impl SecurityProtocol {
    /// Returns the Kafka configuration string for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaslMechanism {
    /// PLAIN mechanism (username/password in clear text).
    #[serde(rename = "plain", alias = "PLAIN")]
    Plain,
    /// SCRAM-SHA-256 mechanism.
    #[default]
    #[serde(rename = "scram-sha-256", alias = "SCRAM-SHA-256")]
    ScramSha256,
    /// SCRAM-SHA-512 mechanism.
    #[serde(rename = "scram-sha-512", alias = "SCRAM-SHA-512")]
    ScramSha512,
}

impl SaslMechanism {
    /// Returns the Kafka configuration string for this mechanism.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL credentials of a cluster.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaslConfig {
    /// Authentication mechanism to use.
    #[serde(default)]
    pub mechanism: SaslMechanism,
    /// SASL username.
    pub username: String,
    /// SASL password.
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SSL/TLS certificate locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfig {
    /// Path to CA certificate file.
    #[serde(default)]
    pub ca_location: Option<String>,
    /// Path to client certificate file (for mTLS).
    #[serde(default)]
    pub certificate_location: Option<String>,
    /// Path to client key file (for mTLS).
    #[serde(default)]
    pub key_location: Option<String>,
}

/// One configured cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Identifier used in consumer locators
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Bootstrap broker addresses (comma-separated)
    pub bootstrap: String,
    /// Explicit security protocol; derived from `sasl`/`ssl` when absent
    #[serde(default)]
    pub security_protocol: Option<SecurityProtocol>,
    #[serde(default)]
    pub sasl: Option<SaslConfig>,
    #[serde(default)]
    pub ssl: Option<SslConfig>,
    /// Named connection provider; the default connector is used when absent
    #[serde(default)]
    pub connection_provider: Option<String>,
}

impl ClusterSettings {
    /// Creates settings for a plaintext cluster.
    pub fn new(id: &str, bootstrap: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            bootstrap: bootstrap.to_string(),
            security_protocol: None,
            sasl: None,
            ssl: None,
            connection_provider: None,
        }
    }

    /// Configures SASL/SCRAM-SHA-256 authentication.
    pub fn with_sasl_scram_sha256(self, username: &str, password: &str) -> Self {
        self.with_sasl(SaslMechanism::ScramSha256, username, password)
    }

    /// Configures SASL authentication with the given mechanism.
    pub fn with_sasl(mut self, mechanism: SaslMechanism, username: &str, password: &str) -> Self {
        self.sasl = Some(SaslConfig {
            mechanism,
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Configures TLS with a CA certificate.
    pub fn with_ssl(mut self, ca_location: &str) -> Self {
        self.ssl = Some(SslConfig {
            ca_location: Some(ca_location.to_string()),
            certificate_location: None,
            key_location: None,
        });
        self
    }

    /// Selects a named connection provider.
    pub fn with_connection_provider(mut self, provider: &str) -> Self {
        self.connection_provider = Some(provider.to_string());
        self
    }

    /// Returns the effective security protocol.
    pub fn security_protocol(&self) -> SecurityProtocol {
        if let Some(protocol) = self.security_protocol {
            return protocol;
        }
        match (self.sasl.is_some(), self.ssl.is_some()) {
            (true, true) => SecurityProtocol::SaslSsl,
            (true, false) => SecurityProtocol::SaslPlaintext,
            (false, true) => SecurityProtocol::Ssl,
            (false, false) => SecurityProtocol::Plaintext,
        }
    }
}

/// Collaborator mapping cluster ids to connection settings.
#[cfg_attr(test, mockall::automock)]
pub trait ClusterLookup: Send + Sync {
    /// Returns the settings of a cluster, if it is configured.
    fn cluster(&self, cluster_id: &str) -> Option<ClusterSettings>;
}

/// Consumer defaults shared by every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSettings {
    /// Policy used when a locator has no `from` parameter
    #[serde(default = "default_offset")]
    pub default_offset: OffsetPolicy,

    /// Attempts made to reach the cluster before a start fails
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Timeout for metadata, watermark and seek requests
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    /// Delay before the collection event that follows a start
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_offset() -> OffsetPolicy {
    OffsetPolicy::Latest
}

fn default_retries() -> u32 {
    3
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

fn default_metadata_timeout_ms() -> u64 {
    5_000
}

fn default_settle_delay_ms() -> u64 {
    200
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            default_offset: default_offset(),
            retries: default_retries(),
            session_timeout_ms: default_session_timeout_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl ConsumerSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Everything a session needs to connect: identity plus resolved cluster settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub cluster: ClusterSettings,
    pub consumer_group_id: String,
    pub topic_id: String,
    /// Requested policy, or the configured default when the locator has none
    pub from_offset: OffsetPolicy,
    /// Parsed partition selection; `None` means every partition
    pub partitions: Option<BTreeSet<i32>>,
    pub retries: u32,
    pub session_timeout: Duration,
    pub metadata_timeout: Duration,
}

impl ConsumerOptions {
    /// Resolves session options for an identity.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::UnknownCluster` if the cluster is not
    /// configured, `ConsumerError::InvalidLocator` if the identity has no
    /// topic, and `ConsumerError::Partitions` for a malformed partition
    /// expression.
    pub fn new(
        identity: &ConsumerIdentity,
        clusters: &dyn ClusterLookup,
        settings: &ConsumerSettings,
    ) -> Result<Self, ConsumerError> {
        let cluster = clusters
            .cluster(&identity.cluster_id)
            .ok_or_else(|| ConsumerError::UnknownCluster(identity.cluster_id.clone()))?;

        if identity.topic_id.trim().is_empty() {
            return Err(ConsumerError::InvalidLocator(format!(
                "no topic for consumer group {}",
                identity.consumer_group_id
            )));
        }

        let partitions = match identity.partitions.as_deref() {
            Some(expression) => parse_partitions(expression)?,
            None => None,
        };

        Ok(Self {
            cluster,
            consumer_group_id: identity.consumer_group_id.clone(),
            topic_id: identity.topic_id.clone(),
            from_offset: identity.from_offset.unwrap_or(settings.default_offset),
            partitions,
            retries: settings.retries,
            session_timeout: Duration::from_millis(settings.session_timeout_ms),
            metadata_timeout: Duration::from_millis(settings.metadata_timeout_ms),
        })
    }

    /// Returns the Kafka client configuration as a key-value list.
    ///
    /// The balanced strategy maps onto the client's `roundrobin` assignor;
    /// the fixed strategy assigns partitions itself and sets no assignor.
    pub fn client_settings(
        &self,
        client_id: &str,
        strategy: &AssignmentStrategy,
    ) -> Vec<(String, String)> {
        let protocol = self.cluster.security_protocol();
        let auto_offset_reset = match self.from_offset {
            OffsetPolicy::Earliest => "earliest",
            _ => "latest",
        };

        let mut settings = vec![
            ("bootstrap.servers".to_string(), self.cluster.bootstrap.clone()),
            ("group.id".to_string(), self.consumer_group_id.clone()),
            ("client.id".to_string(), client_id.to_string()),
            ("auto.offset.reset".to_string(), auto_offset_reset.to_string()),
            ("enable.auto.commit".to_string(), "true".to_string()),
            (
                "session.timeout.ms".to_string(),
                self.session_timeout.as_millis().to_string(),
            ),
            ("security.protocol".to_string(), protocol.as_str().to_string()),
        ];

        if let AssignmentStrategy::Balanced = strategy {
            settings.push((
                "partition.assignment.strategy".to_string(),
                strategy.protocol_name().to_string(),
            ));
        }

        if let Some(sasl) = &self.cluster.sasl {
            settings.push((
                "sasl.mechanism".to_string(),
                sasl.mechanism.as_str().to_string(),
            ));
            settings.push(("sasl.username".to_string(), sasl.username.clone()));
            settings.push(("sasl.password".to_string(), sasl.password.clone()));
        }

        if let Some(ssl) = &self.cluster.ssl {
            if let Some(ca) = &ssl.ca_location {
                settings.push(("ssl.ca.location".to_string(), ca.clone()));
            }
            if let Some(cert) = &ssl.certificate_location {
                settings.push(("ssl.certificate.location".to_string(), cert.clone()));
            }
            if let Some(key) = &ssl.key_location {
                settings.push(("ssl.key.location".to_string(), key.clone()));
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::partitions::PartitionParseError;
    use std::collections::HashMap;

    fn lookup_with(cluster: ClusterSettings) -> MockClusterLookup {
        let mut lookup = MockClusterLookup::new();
        lookup.expect_cluster().returning(move |id| {
            if id == cluster.id {
                Some(cluster.clone())
            } else {
                None
            }
        });
        lookup
    }

    #[test]
    fn test_options_resolve_cluster_and_partitions() {
        let lookup = lookup_with(ClusterSettings::new("clusterA", "localhost:9092"));
        let identity = ConsumerIdentity::new("clusterA", "group1", "orders")
            .with_from_offset(OffsetPolicy::Earliest)
            .with_partitions("0-1");

        let options = ConsumerOptions::new(&identity, &lookup, &ConsumerSettings::default()).unwrap();

        assert_eq!(options.cluster.bootstrap, "localhost:9092");
        assert_eq!(options.consumer_group_id, "group1");
        assert_eq!(options.topic_id, "orders");
        assert_eq!(options.from_offset, OffsetPolicy::Earliest);
        assert_eq!(options.partitions, Some(BTreeSet::from([0, 1])));
    }

    #[test]
    fn test_options_unknown_cluster() {
        let mut lookup = MockClusterLookup::new();
        lookup.expect_cluster().times(1).returning(|_| None);
        let identity = ConsumerIdentity::new("missing", "g", "t");

        let err = ConsumerOptions::new(&identity, &lookup, &ConsumerSettings::default()).unwrap_err();
        assert_eq!(err, ConsumerError::UnknownCluster("missing".to_string()));
    }

    #[test]
    fn test_options_apply_default_offset() {
        let lookup = lookup_with(ClusterSettings::new("c", "b:9092"));
        let settings = ConsumerSettings {
            default_offset: OffsetPolicy::Earliest,
            ..ConsumerSettings::default()
        };

        let options =
            ConsumerOptions::new(&ConsumerIdentity::new("c", "g", "t"), &lookup, &settings).unwrap();
        assert_eq!(options.from_offset, OffsetPolicy::Earliest);
        assert_eq!(options.partitions, None);
    }

    #[test]
    fn test_options_malformed_partitions() {
        let lookup = lookup_with(ClusterSettings::new("c", "b:9092"));
        let identity = ConsumerIdentity::new("c", "g", "t").with_partitions("1,x");

        let err = ConsumerOptions::new(&identity, &lookup, &ConsumerSettings::default()).unwrap_err();
        assert_eq!(
            err,
            ConsumerError::Partitions(PartitionParseError::UnexpectedCharacter {
                character: 'x',
                position: 2
            })
        );
    }

    #[test]
    fn test_options_require_topic() {
        let lookup = lookup_with(ClusterSettings::new("c", "b:9092"));
        let err = ConsumerOptions::new(
            &ConsumerIdentity::new("c", "g", ""),
            &lookup,
            &ConsumerSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConsumerError::InvalidLocator(_)));
    }

    #[test]
    fn test_client_settings_balanced() {
        let lookup = lookup_with(
            ClusterSettings::new("c", "kafka:9093").with_sasl_scram_sha256("user", "pass"),
        );
        let identity = ConsumerIdentity::new("c", "viewers", "orders")
            .with_from_offset(OffsetPolicy::Earliest);
        let options = ConsumerOptions::new(&identity, &lookup, &ConsumerSettings::default()).unwrap();

        let settings: HashMap<_, _> = options
            .client_settings("client-1", &AssignmentStrategy::Balanced)
            .into_iter()
            .collect();

        assert_eq!(settings.get("bootstrap.servers").unwrap(), "kafka:9093");
        assert_eq!(settings.get("group.id").unwrap(), "viewers");
        assert_eq!(settings.get("client.id").unwrap(), "client-1");
        assert_eq!(settings.get("auto.offset.reset").unwrap(), "earliest");
        assert_eq!(settings.get("partition.assignment.strategy").unwrap(), "roundrobin");
        assert_eq!(settings.get("security.protocol").unwrap(), "SASL_PLAINTEXT");
        assert_eq!(settings.get("sasl.mechanism").unwrap(), "SCRAM-SHA-256");
        assert_eq!(settings.get("sasl.username").unwrap(), "user");
        assert_eq!(settings.get("sasl.password").unwrap(), "pass");
        assert_eq!(settings.get("session.timeout.ms").unwrap(), "30000");
    }

    #[test]
    fn test_client_settings_fixed_has_no_assignor() {
        let lookup = lookup_with(ClusterSettings::new("c", "b:9092").with_ssl("/ca.pem"));
        let identity = ConsumerIdentity::new("c", "g", "t").with_partitions("1");
        let options = ConsumerOptions::new(&identity, &lookup, &ConsumerSettings::default()).unwrap();
        let strategy = AssignmentStrategy::for_partitions(options.partitions.as_ref());

        let settings: HashMap<_, _> = options
            .client_settings("client-1", &strategy)
            .into_iter()
            .collect();

        assert!(!settings.contains_key("partition.assignment.strategy"));
        assert_eq!(settings.get("auto.offset.reset").unwrap(), "latest");
        assert_eq!(settings.get("security.protocol").unwrap(), "SSL");
        assert_eq!(settings.get("ssl.ca.location").unwrap(), "/ca.pem");
    }

    #[test]
    fn test_security_protocol_derivation() {
        let plain = ClusterSettings::new("c", "b");
        assert_eq!(plain.security_protocol(), SecurityProtocol::Plaintext);

        let explicit = ClusterSettings {
            security_protocol: Some(SecurityProtocol::SaslSsl),
            ..ClusterSettings::new("c", "b")
        };
        assert_eq!(explicit.security_protocol(), SecurityProtocol::SaslSsl);

        let sasl_ssl = ClusterSettings::new("c", "b")
            .with_sasl(SaslMechanism::Plain, "u", "p")
            .with_ssl("/ca");
        assert_eq!(sasl_ssl.security_protocol(), SecurityProtocol::SaslSsl);
    }

    #[test]
    fn test_cluster_settings_yaml() {
        let yaml = r#"
id: prod
bootstrap: kafka1:9092,kafka2:9092
sasl:
  mechanism: scram-sha-512
  username: viewer
  password: secret
connection_provider: managed
"#;
        let cluster: ClusterSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cluster.id, "prod");
        assert_eq!(cluster.name, "");
        let sasl = cluster.sasl.as_ref().unwrap();
        assert_eq!(sasl.mechanism, SaslMechanism::ScramSha512);
        assert_eq!(cluster.connection_provider.as_deref(), Some("managed"));
        assert!(!format!("{:?}", sasl).contains("secret"));
    }

    #[test]
    fn test_mechanism_and_protocol_strings() {
        assert_eq!(SecurityProtocol::SaslPlaintext.as_str(), "SASL_PLAINTEXT");
        assert_eq!(SaslMechanism::ScramSha512.as_str(), "SCRAM-SHA-512");
        let protocol: SecurityProtocol = serde_yaml::from_str("SASL_SSL").unwrap();
        assert_eq!(protocol, SecurityProtocol::SaslSsl);
    }
}
