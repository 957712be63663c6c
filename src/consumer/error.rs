//! Errors raised by the consumer session subsystem.

use thiserror::Error;

use super::partitions::PartitionParseError;

/// Errors that can occur while building, starting, or running a viewer session.
///
/// The variants group into four classes:
///
/// - configuration: `UnknownCluster`, `UnknownConnectionProvider`,
///   `InvalidLocator`, `InvalidOffset`
/// - parse: `Partitions`
/// - connection: `Connection`, `Kafka`
/// - delivery: `Delivery`
///
/// Only delivery errors are non-fatal; see [`ConsumerError::is_fatal`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The locator references a cluster that is not configured.
    #[error("Cannot create consumer, unknown cluster {0}")]
    UnknownCluster(String),

    /// The cluster selects a connection provider that is not registered.
    #[error("Unknown connection provider: {0}")]
    UnknownConnectionProvider(String),

    /// The locator string is malformed.
    #[error("Invalid consumer locator: {0}")]
    InvalidLocator(String),

    /// The starting offset is neither a policy keyword nor a numeric offset.
    #[error("Invalid starting offset: {0}")]
    InvalidOffset(String),

    /// The partition expression is malformed.
    #[error("Invalid partitions: {0}")]
    Partitions(#[from] PartitionParseError),

    /// Broker unreachable, authentication, join-group, subscribe or seek failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by the Kafka client library.
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// Per-message consumption error; the session keeps running.
    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl ConsumerError {
    /// Returns `false` for errors that do not tear down a running session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Delivery(_))
    }
}

impl From<rdkafka::error::KafkaError> for ConsumerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::Kafka(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_cluster_display() {
        let error = ConsumerError::UnknownCluster("clusterA".to_string());
        assert_eq!(
            error.to_string(),
            "Cannot create consumer, unknown cluster clusterA"
        );
    }

    #[test]
    fn test_partitions_error_conversion() {
        let parse_error = PartitionParseError::UnexpectedCharacter {
            character: 'x',
            position: 2,
        };
        let error: ConsumerError = parse_error.into();
        assert!(matches!(error, ConsumerError::Partitions(_)));
        assert!(error.to_string().contains("'x'"));
    }

    #[test]
    fn test_delivery_error_is_not_fatal() {
        assert!(!ConsumerError::Delivery("corrupt record".to_string()).is_fatal());
        assert!(ConsumerError::Connection("refused".to_string()).is_fatal());
        assert!(ConsumerError::UnknownCluster("x".to_string()).is_fatal());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConsumerError>();
    }
}
