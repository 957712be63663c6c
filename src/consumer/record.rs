//! Records and event payloads emitted by viewer sessions.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

use super::error::ConsumerError;
use super::locator::ConsumerLocator;

/// A record received from the broker.
///
/// `value` is `None` for tombstones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    /// Broker timestamp, when the broker provides one
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConsumedRecord {
    /// Creates a record without key or timestamp.
    pub fn new(topic: &str, partition: i32, offset: i64, value: Option<Bytes>) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            key: None,
            value,
            timestamp: None,
        }
    }

    /// Returns the key decoded as UTF-8, replacing invalid sequences.
    pub fn key_str(&self) -> Option<Cow<'_, str>> {
        self.key.as_deref().map(String::from_utf8_lossy)
    }

    /// Returns the value decoded as UTF-8, replacing invalid sequences.
    pub fn value_str(&self) -> Option<Cow<'_, str>> {
        self.value.as_deref().map(String::from_utf8_lossy)
    }

    /// Returns `true` when the record has no value.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Converts the record to a serializable view with text key and value.
    pub fn to_view(&self) -> RecordView {
        RecordView {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset.to_string(),
            key: self.key_str().map(Cow::into_owned),
            value: self.value_str().map(Cow::into_owned),
            timestamp: self.timestamp,
        }
    }
}

/// Text rendering of a [`ConsumedRecord`], used for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub topic: String,
    pub partition: i32,
    pub offset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A record delivered by a session.
#[derive(Debug, Clone)]
pub struct RecordReceivedEvent {
    pub locator: ConsumerLocator,
    pub record: ConsumedRecord,
}

/// An error raised by a session while it is running.
#[derive(Debug, Clone)]
pub struct ConsumerErrorEvent {
    pub locator: ConsumerLocator,
    pub error: ConsumerError,
}

/// Group membership status reported by the broker client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerStatus {
    Created,
    Rebalancing,
    Rebalanced,
}

impl fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Rebalancing => f.write_str("rebalancing"),
            Self::Rebalanced => f.write_str("rebalanced"),
        }
    }
}

/// A status change of a session's group membership.
#[derive(Debug, Clone)]
pub struct ConsumerChangedStatusEvent {
    pub locator: ConsumerLocator,
    pub status: ConsumerStatus,
}
