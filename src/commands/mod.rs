/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `consume`    - Run a viewer session and print its records
- `locator`    - Encode and decode consumer locators
- `partitions` - Normalize partition expressions
- `clusters`   - List configured clusters

Formatting lives in plain functions returning `String`s so handlers stay
thin and the output can be tested without a terminal.
*/

use crate::cli::IdentityArgs;
use crate::config::Config;
use crate::consumer::{ConsumerIdentity, ConsumerLocator, OffsetPolicy};
use crate::error::{Result, ViewerError};

/// Build a locator from either a locator string or separate identity flags.
///
/// # Arguments
///
/// * `locator` - Locator string, takes precedence when present
/// * `identity` - Identity flags
/// * `require_topic` - Reject identities without a topic
///
/// # Errors
///
/// Returns a usage error when neither form is complete, or a consumer
/// error when the locator or starting offset is malformed
pub fn resolve_locator(
    locator: Option<&str>,
    identity: &IdentityArgs,
    require_topic: bool,
) -> Result<ConsumerLocator> {
    let identity = match locator {
        Some(locator) => ConsumerIdentity::decode(locator)?,
        None => identity_from_args(identity)?,
    };
    if require_topic && identity.topic_id.is_empty() {
        return Err(ViewerError::Usage("a topic is required (--topic or ?topic=)".to_string()).into());
    }
    Ok(identity.locator())
}

/// Build an identity from CLI flags.
///
/// # Errors
///
/// Returns a usage error if `--cluster` or `--group` is missing, or a
/// consumer error for an invalid `--from`
pub fn identity_from_args(args: &IdentityArgs) -> Result<ConsumerIdentity> {
    let cluster = args
        .cluster
        .as_deref()
        .ok_or_else(|| ViewerError::Usage("--cluster is required".to_string()))?;
    let group = args
        .group
        .as_deref()
        .ok_or_else(|| ViewerError::Usage("--group is required".to_string()))?;

    let mut identity = ConsumerIdentity::new(cluster, group, args.topic.as_deref().unwrap_or(""));
    if let Some(from) = args.from.as_deref() {
        identity = identity.with_from_offset(from.parse::<OffsetPolicy>()?);
    }
    if let Some(partitions) = args.partitions.as_deref() {
        identity = identity.with_partitions(partitions);
    }
    Ok(identity)
}

// Viewer session handler
pub mod consume {
    //! Runs one viewer session until Ctrl-C.
    //!
    //! The session is created through a [`ConsumerRegistry`] backed by the
    //! Kafka connector. Records are printed to STDOUT; errors and status
    //! changes go to the log.

    use super::*;
    use crate::consumer::{
        ConsumedRecord, ConsumerChangedStatusEvent, ConsumerCollectionChangedEvent,
        ConsumerErrorEvent, ConsumerRegistry, ConsumerSession, KafkaConnector,
        RecordReceivedEvent,
    };
    use colored::Colorize;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Start a session and print its records
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded and validated configuration
    /// * `locator` - Session to start
    /// * `json` - Print records as JSON lines
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be created or started
    pub async fn run_consume(config: Config, locator: ConsumerLocator, json: bool) -> Result<()> {
        let config = Arc::new(config);
        let registry = ConsumerRegistry::new(
            config.clone(),
            config.consumer.clone(),
            Arc::new(KafkaConnector::new()),
        );
        registry.on_collection_changed(|event: &ConsumerCollectionChangedEvent| {
            for consumer in &event.consumers {
                tracing::info!(locator = %consumer.locator(), state = %event.state, "Consumer collection changed");
            }
        });

        let (records_tx, mut records) = mpsc::unbounded_channel();
        let session = registry
            .create_with(&locator, move |session| attach_listeners(session, records_tx))
            .await?;
        tracing::info!(
            locator = %locator,
            topic = session.topic_id(),
            strategy = session.strategy().protocol_name(),
            "Viewing topic, press Ctrl-C to stop"
        );

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let result = loop {
            tokio::select! {
                _ = &mut ctrl_c => break Ok(()),
                record = records.recv() => {
                    let Some(record) = record else {
                        break Ok(());
                    };
                    match format_record(&record, json) {
                        Ok(line) => println!("{}", line),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        registry.close(&locator).await;
        registry.dispose().await;
        result
    }

    /// Forward records to `records` and log errors and status changes
    fn attach_listeners(session: &ConsumerSession, records: mpsc::UnboundedSender<ConsumedRecord>) {
        session.records().subscribe(move |event: &RecordReceivedEvent| {
            let _ = records.send(event.record.clone());
        });
        session.errors().subscribe(|event: &ConsumerErrorEvent| {
            tracing::warn!(locator = %event.locator, "Consumer error: {}", event.error);
        });
        session
            .status_changes()
            .subscribe(|event: &ConsumerChangedStatusEvent| {
                tracing::info!(locator = %event.locator, status = %event.status, "Consumer status");
            });
    }

    /// Render one record as a JSON line or a colored text line
    ///
    /// # Errors
    ///
    /// Returns error if JSON serialization fails
    pub fn format_record(record: &ConsumedRecord, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string(&record.to_view())?);
        }

        let position = format!("{}/{}@{}", record.topic, record.partition, record.offset);
        let key = record
            .key_str()
            .map(|k| k.into_owned())
            .unwrap_or_else(|| "-".to_string());
        let value = match record.value_str() {
            Some(value) => value.into_owned(),
            None => "<tombstone>".dimmed().to_string(),
        };
        let mut line = format!("{} {} {}", position.cyan(), key.yellow(), value);
        if let Some(timestamp) = record.timestamp {
            line = format!("{} {}", timestamp.to_rfc3339().dimmed(), line);
        }
        Ok(line)
    }

}

// Locator encode/decode handlers
pub mod locator {
    //! Prints encoded locators and decoded identities.

    use super::*;
    use crate::consumer::{parse_partitions, render_partitions, AssignmentStrategy};
    use colored::Colorize;

    /// Describe a decoded locator, one field per line
    ///
    /// # Errors
    ///
    /// Returns error if the locator or its partition expression is malformed
    pub fn describe_locator(locator: &str) -> Result<String> {
        let identity = ConsumerIdentity::decode(locator)?;
        let partitions = match identity.partitions.as_deref() {
            Some(expression) => parse_partitions(expression)?,
            None => None,
        };
        let strategy = AssignmentStrategy::for_partitions(partitions.as_ref());

        let from = identity
            .from_offset
            .map(|policy| policy.to_string())
            .unwrap_or_else(|| "(configured default)".to_string());
        let topic = if identity.topic_id.is_empty() {
            "-".to_string()
        } else {
            identity.topic_id.clone()
        };
        let partitions = match partitions {
            None => "all".to_string(),
            Some(set) if set.is_empty() => "none".to_string(),
            Some(set) => render_partitions(&set),
        };

        let rows = [
            ("cluster", identity.cluster_id.clone()),
            ("group", identity.consumer_group_id.clone()),
            ("topic", topic),
            ("from", from),
            ("partitions", partitions),
            ("assignor", strategy.protocol_name().to_string()),
        ];
        Ok(rows
            .iter()
            .map(|(label, value)| format!("{:<12}{}", format!("{}:", label).bold(), value))
            .collect::<Vec<_>>()
            .join("\n"))
    }

}

// Partition expression handler
pub mod partitions {
    //! Normalizes partition expressions.

    use super::*;
    use crate::consumer::{parse_partitions, render_partitions};

    /// Describe the partition set of an expression
    ///
    /// # Errors
    ///
    /// Returns error if the expression is malformed
    pub fn describe_partitions(expression: &str) -> Result<String> {
        Ok(match parse_partitions(expression)? {
            None => "all partitions".to_string(),
            Some(set) if set.is_empty() => "no partitions".to_string(),
            Some(set) => {
                let listed = set.iter().map(|p| p.to_string()).collect::<Vec<_>>();
                format!("{} [{}]", render_partitions(&set), listed.join(", "))
            }
        })
    }

}

// Cluster listing handler
pub mod clusters {
    //! Lists configured clusters.

    use super::*;
    use colored::Colorize;

    /// Describe every configured cluster, one per line
    pub fn describe_clusters(config: &Config) -> String {
        if config.clusters.is_empty() {
            return "No clusters configured".to_string();
        }
        config
            .clusters
            .iter()
            .map(|cluster| {
                let mut line = format!(
                    "{} ({}) {} {}",
                    cluster.id.green().bold(),
                    if cluster.name.is_empty() { &cluster.id } else { &cluster.name },
                    cluster.bootstrap,
                    cluster.security_protocol().as_str()
                );
                if let Some(provider) = &cluster.connection_provider {
                    line.push_str(&format!(" provider={}", provider));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

}
