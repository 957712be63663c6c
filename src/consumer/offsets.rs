//! Starting position resolution.
//!
//! The subscribe call only knows "from the beginning" or "from the end".
//! Everything else (explicit partitions, literal offsets) becomes a list of
//! per-partition seeks computed here after the session has joined its group:
//!
//! | policy     | partitions | seeks                                        |
//! |------------|------------|----------------------------------------------|
//! | `earliest` | any        | none                                         |
//! | `latest`   | none       | none                                         |
//! | `latest`   | explicit   | each partition to its high watermark         |
//! | `default`  | none       | none                                         |
//! | `default`  | explicit   | each partition to its low watermark          |
//! | `<n>`      | any        | each owned partition to `n`                  |
//!
//! A partition missing from the watermark response seeks to `0`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::broker::BrokerAdmin;
use super::error::ConsumerError;
use super::locator::OffsetPolicy;

/// Arguments of the subscribe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    pub topic: String,
    /// `Some(true)` for earliest, `Some(false)` for latest, `None` to let the client decide
    pub from_beginning: Option<bool>,
}

impl SubscribeOptions {
    /// Builds subscribe options for a topic and starting policy.
    pub fn new(topic: &str, policy: OffsetPolicy) -> Self {
        let from_beginning = match policy {
            OffsetPolicy::Earliest => Some(true),
            OffsetPolicy::Latest => Some(false),
            OffsetPolicy::Default | OffsetPolicy::Offset(_) => None,
        };
        Self {
            topic: topic.to_string(),
            from_beginning,
        }
    }
}

/// Low and high watermark of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionWatermarks {
    pub partition: i32,
    pub low: i64,
    pub high: i64,
}

/// One seek issued after subscribing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekEntry {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Returns `true` when a policy and partition selection need seeks at all.
pub fn requires_seek(policy: OffsetPolicy, partitions: Option<&BTreeSet<i32>>) -> bool {
    match policy {
        OffsetPolicy::Earliest => false,
        OffsetPolicy::Offset(_) => true,
        OffsetPolicy::Latest | OffsetPolicy::Default => partitions.is_some(),
    }
}

/// Picks the offset to seek one partition to, given fetched watermarks.
///
/// Returns `None` for policies that never seek through watermarks.
pub fn offset_to_seek(
    watermarks: &[PartitionWatermarks],
    policy: OffsetPolicy,
    partition: i32,
) -> Option<i64> {
    let found = watermarks.iter().find(|w| w.partition == partition);
    match policy {
        OffsetPolicy::Latest => Some(found.map(|w| w.high).unwrap_or(0)),
        OffsetPolicy::Default => Some(found.map(|w| w.low).unwrap_or(0)),
        OffsetPolicy::Offset(offset) => Some(offset),
        OffsetPolicy::Earliest => None,
    }
}

/// Computes the seeks that position a session.
///
/// Watermarks are fetched only for explicit partitions under `latest` or
/// `default`. A literal offset applies to every owned partition: the
/// explicit set, else every partition the topic metadata lists, else
/// partition `0` alone.
///
/// # Errors
///
/// Propagates metadata and watermark failures from `admin`.
///
/// # Example
///
/// ```ignore
/// let seeks = resolve_seeks(connection.as_ref(), "orders", OffsetPolicy::Offset(100), None).await?;
/// ```
pub async fn resolve_seeks<A>(
    admin: &A,
    topic: &str,
    policy: OffsetPolicy,
    partitions: Option<&BTreeSet<i32>>,
) -> Result<Vec<SeekEntry>, ConsumerError>
where
    A: BrokerAdmin + ?Sized,
{
    if !requires_seek(policy, partitions) {
        return Ok(Vec::new());
    }

    let seek = |partition: i32, offset: i64| SeekEntry {
        topic: topic.to_string(),
        partition,
        offset,
    };

    if let OffsetPolicy::Offset(offset) = policy {
        let owned: Vec<i32> = match partitions {
            Some(partitions) => partitions.iter().copied().collect(),
            None => {
                let mut listed = admin.fetch_topic_partitions(topic).await?;
                listed.sort_unstable();
                listed.dedup();
                if listed.is_empty() {
                    vec![0]
                } else {
                    listed
                }
            }
        };
        return Ok(owned.into_iter().map(|p| seek(p, offset)).collect());
    }

    let Some(partitions) = partitions else {
        return Ok(Vec::new());
    };
    let watermarks = admin.fetch_topic_offsets(topic).await?;
    Ok(partitions
        .iter()
        .filter_map(|&p| offset_to_seek(&watermarks, policy, p).map(|offset| seek(p, offset)))
        .collect())
}
