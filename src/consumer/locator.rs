//! Consumer identities and their addressable locators.
//!
//! Every viewer session is addressed by a locator string of the form:
//!
//! ```text
//! kafka:<clusterId>/<consumerGroupId>[?topic=<topicId>][&from=<offset>][&partitions=<expression>]
//! ```
//!
//! Query values are URL-encoded. Optional parameters are written only when
//! present, and blank values decode to "absent".
//!
//! # Example
//!
//! ```
//! use kafka_viewer::consumer::locator::{ConsumerIdentity, OffsetPolicy};
//!
//! let identity = ConsumerIdentity::decode(
//!     "kafka:clusterA/group1?topic=orders&from=earliest&partitions=0-1",
//! )
//! .unwrap();
//!
//! assert_eq!(identity.cluster_id, "clusterA");
//! assert_eq!(identity.consumer_group_id, "group1");
//! assert_eq!(identity.topic_id, "orders");
//! assert_eq!(identity.from_offset, Some(OffsetPolicy::Earliest));
//! assert_eq!(identity.partitions.as_deref(), Some("0-1"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

use super::error::ConsumerError;

/// Scheme prefix of every consumer locator.
pub const CONSUMER_SCHEME: &str = "kafka";

const TOPIC_QUERY_PARAMETER: &str = "topic";
const FROM_QUERY_PARAMETER: &str = "from";
const PARTITIONS_QUERY_PARAMETER: &str = "partitions";

/// Requested starting point of a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OffsetPolicy {
    /// Start from the oldest available record.
    Earliest,
    /// Start from the newest record.
    Latest,
    /// Let the broker decide.
    Default,
    /// Start from a literal offset on every owned partition.
    Offset(i64),
}

impl OffsetPolicy {
    /// Returns `true` when seeks should land on the high watermark.
    pub fn is_latest_like(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// Returns the literal offset, if this is a numeric policy.
    pub fn literal_offset(&self) -> Option<i64> {
        match self {
            Self::Offset(offset) => Some(*offset),
            _ => None,
        }
    }
}

impl fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Earliest => f.write_str("earliest"),
            Self::Latest => f.write_str("latest"),
            Self::Default => f.write_str("default"),
            Self::Offset(offset) => write!(f, "{}", offset),
        }
    }
}

impl FromStr for OffsetPolicy {
    type Err = ConsumerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            "default" => Ok(Self::Default),
            _ => match value.parse::<i64>() {
                Ok(offset) if offset >= 0 => Ok(Self::Offset(offset)),
                _ => Err(ConsumerError::InvalidOffset(value.to_string())),
            },
        }
    }
}

impl TryFrom<String> for OffsetPolicy {
    type Error = ConsumerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OffsetPolicy> for String {
    fn from(policy: OffsetPolicy) -> Self {
        policy.to_string()
    }
}

/// Structured identity of a viewer session.
///
/// `partitions` holds the raw expression as written in the locator. It is
/// parsed by the session constructor, not here, so a malformed expression
/// survives decoding and is reported when the session is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerIdentity {
    /// Configured cluster id
    pub cluster_id: String,
    /// Consumer group joined by the session
    pub consumer_group_id: String,
    /// Topic to view; empty when the locator has no `topic` parameter
    pub topic_id: String,
    /// Requested starting offset policy
    pub from_offset: Option<OffsetPolicy>,
    /// Raw partition expression
    pub partitions: Option<String>,
}

impl ConsumerIdentity {
    /// Creates an identity without starting offset or partition selection.
    pub fn new(cluster_id: &str, consumer_group_id: &str, topic_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            consumer_group_id: consumer_group_id.to_string(),
            topic_id: topic_id.to_string(),
            from_offset: None,
            partitions: None,
        }
    }

    /// Sets the starting offset policy.
    pub fn with_from_offset(mut self, from_offset: OffsetPolicy) -> Self {
        self.from_offset = Some(from_offset);
        self
    }

    /// Sets the partition expression.
    pub fn with_partitions(mut self, partitions: &str) -> Self {
        self.partitions = Some(partitions.to_string());
        self
    }

    /// Encodes the identity as a locator string.
    pub fn encode(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if !self.topic_id.is_empty() {
            query.append_pair(TOPIC_QUERY_PARAMETER, &self.topic_id);
        }
        if let Some(from) = &self.from_offset {
            query.append_pair(FROM_QUERY_PARAMETER, &from.to_string());
        }
        if let Some(partitions) = &self.partitions {
            query.append_pair(PARTITIONS_QUERY_PARAMETER, partitions);
        }
        let query = query.finish();

        let path = format!(
            "{}:{}/{}",
            CONSUMER_SCHEME, self.cluster_id, self.consumer_group_id
        );
        if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        }
    }

    /// Returns the locator addressing this identity.
    pub fn locator(&self) -> ConsumerLocator {
        ConsumerLocator(self.encode())
    }

    /// Decodes a locator string into an identity.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::InvalidLocator` when the scheme is not
    /// `kafka`, or the cluster or group id is missing. Returns
    /// `ConsumerError::InvalidOffset` when `from` is neither a policy
    /// keyword nor a non-negative number.
    pub fn decode(locator: &str) -> Result<Self, ConsumerError> {
        let rest = locator
            .strip_prefix(CONSUMER_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| {
                ConsumerError::InvalidLocator(format!(
                    "expected '{}:' scheme in {}",
                    CONSUMER_SCHEME, locator
                ))
            })?;

        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (cluster_id, consumer_group_id) = path.split_once('/').unwrap_or((path, ""));

        if cluster_id.is_empty() {
            return Err(ConsumerError::InvalidLocator(format!(
                "missing cluster id in {}",
                locator
            )));
        }
        if consumer_group_id.is_empty() {
            return Err(ConsumerError::InvalidLocator(format!(
                "missing consumer group id in {}",
                locator
            )));
        }

        let mut topic_id = None;
        let mut from = None;
        let mut partitions = None;
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match name.as_ref() {
                TOPIC_QUERY_PARAMETER => &mut topic_id,
                FROM_QUERY_PARAMETER => &mut from,
                PARTITIONS_QUERY_PARAMETER => &mut partitions,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let from_offset = non_blank(from)
            .map(|f| f.parse::<OffsetPolicy>())
            .transpose()?;

        Ok(Self {
            cluster_id: cluster_id.to_string(),
            consumer_group_id: consumer_group_id.to_string(),
            topic_id: topic_id.unwrap_or_default(),
            from_offset,
            partitions: non_blank(partitions),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Registry key of a viewer session.
///
/// Two sessions are the same session exactly when their locator strings are
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerLocator(String);

impl ConsumerLocator {
    /// Wraps a locator string without validating it.
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Returns the locator string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the identity this locator addresses.
    pub fn identity(&self) -> Result<ConsumerIdentity, ConsumerError> {
        ConsumerIdentity::decode(&self.0)
    }
}

impl fmt::Display for ConsumerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConsumerLocator {
    type Err = ConsumerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ConsumerIdentity::decode(value)?;
        Ok(Self(value.to_string()))
    }
}

impl From<&ConsumerIdentity> for ConsumerLocator {
    fn from(identity: &ConsumerIdentity) -> Self {
        identity.locator()
    }
}
