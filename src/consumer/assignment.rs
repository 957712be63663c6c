//! Partition assignment strategies for viewer sessions.
//!
//! A session either lets the broker client balance partitions across the
//! group ([`AssignmentStrategy::Balanced`]) or pins an explicit partition set
//! to one deterministic member ([`AssignmentStrategy::Fixed`]).
//!
//! The fixed strategy follows the two-phase join/sync flow of a consumer
//! group: during join every member advertises [`MemberMetadata`] carrying
//! only its topic list, then the group leader computes an
//! [`AssignmentPlan`] that hands the whole requested set to the
//! lexicographically smallest member id.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};

/// Protocol name of the fixed partition assignor.
pub const FIXED_ASSIGNOR_NAME: &str = "AssignedPartitionsAssigner";

/// Protocol version of the fixed partition assignor.
pub const FIXED_ASSIGNOR_VERSION: i16 = 1;

/// Protocol name of the broker client's standard balanced assignor.
pub const ROUND_ROBIN_ASSIGNOR_NAME: &str = "roundrobin";

/// Metadata a member advertises while joining the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMetadata {
    pub version: i16,
    pub topics: Vec<String>,
    pub user_data: Bytes,
}

/// Protocol advertised by a member during the join phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolDescription {
    pub name: String,
    pub metadata: MemberMetadata,
}

/// Partitions owned by one member after a rebalance round.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberAssignment {
    pub version: i16,
    pub assignment: BTreeMap<String, BTreeSet<i32>>,
    pub user_data: Bytes,
}

/// Result of one rebalance round: member id to owned (topic, partition) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssignmentPlan {
    members: BTreeMap<String, MemberAssignment>,
}

impl AssignmentPlan {
    /// Returns the assignment of a member, if it took part in the round.
    pub fn member(&self, member_id: &str) -> Option<&MemberAssignment> {
        self.members.get(member_id)
    }

    /// Returns the partitions a member owns for a topic.
    ///
    /// Members that own nothing for the topic yield an empty set.
    pub fn partitions_for(&self, member_id: &str, topic: &str) -> BTreeSet<i32> {
        self.members
            .get(member_id)
            .and_then(|m| m.assignment.get(topic))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the member owning a partition, if any.
    pub fn owner_of(&self, topic: &str, partition: i32) -> Option<&str> {
        self.members.iter().find_map(|(member_id, assignment)| {
            assignment
                .assignment
                .get(topic)
                .filter(|partitions| partitions.contains(&partition))
                .map(|_| member_id.as_str())
        })
    }

    /// Iterates over `(member_id, assignment)` pairs in member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemberAssignment)> {
        self.members.iter().map(|(id, a)| (id.as_str(), a))
    }

    /// Number of members covered by the plan.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when no member took part in the round.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Assignor pinning an explicit partition set to a single member.
///
/// The partition set is fixed when the session is built; `assign` and
/// `protocol` are pure functions of their inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPartitionAssignor {
    partitions: BTreeSet<i32>,
}

impl FixedPartitionAssignor {
    /// Creates an assignor for the given partitions.
    pub fn new(partitions: BTreeSet<i32>) -> Self {
        Self { partitions }
    }

    pub fn name(&self) -> &'static str {
        FIXED_ASSIGNOR_NAME
    }

    pub fn version(&self) -> i16 {
        FIXED_ASSIGNOR_VERSION
    }

    /// The requested partitions.
    pub fn partitions(&self) -> &BTreeSet<i32> {
        &self.partitions
    }

    /// Describes the protocol this member advertises while joining.
    ///
    /// The metadata carries the subscribed topics only; partitions are
    /// decided in the sync phase.
    pub fn protocol(&self, topics: &[String]) -> ProtocolDescription {
        ProtocolDescription {
            name: self.name().to_string(),
            metadata: MemberMetadata {
                version: self.version(),
                topics: topics.to_vec(),
                user_data: Bytes::new(),
            },
        }
    }

    /// Computes the assignment for one rebalance round.
    ///
    /// The lexicographically smallest member id receives every requested
    /// partition of every topic; all other members receive an empty set for
    /// each topic. An empty member list yields an empty plan.
    pub fn assign(&self, member_ids: &[String], topics: &[String]) -> AssignmentPlan {
        let mut sorted: Vec<&String> = member_ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let Some(first) = sorted.first().copied() else {
            return AssignmentPlan::default();
        };

        let members = sorted
            .iter()
            .map(|member_id| {
                let owned = if *member_id == first {
                    self.partitions.clone()
                } else {
                    BTreeSet::new()
                };
                let assignment = topics
                    .iter()
                    .map(|topic| (topic.clone(), owned.clone()))
                    .collect();
                (
                    (*member_id).clone(),
                    MemberAssignment {
                        version: self.version(),
                        assignment,
                        user_data: Bytes::new(),
                    },
                )
            })
            .collect();

        AssignmentPlan { members }
    }
}

/// Rebalance strategy selected per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentStrategy {
    /// Delegate to the broker client's round-robin assignor.
    Balanced,
    /// Pin the requested partitions to one member.
    Fixed(FixedPartitionAssignor),
}

impl AssignmentStrategy {
    /// Picks the strategy for an optional explicit partition set.
    pub fn for_partitions(partitions: Option<&BTreeSet<i32>>) -> Self {
        match partitions {
            Some(partitions) => Self::Fixed(FixedPartitionAssignor::new(partitions.clone())),
            None => Self::Balanced,
        }
    }

    /// Protocol name registered with the group coordinator.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Balanced => ROUND_ROBIN_ASSIGNOR_NAME,
            Self::Fixed(assignor) => assignor.name(),
        }
    }

    /// The pinned partitions, for the fixed strategy.
    pub fn fixed_partitions(&self) -> Option<&BTreeSet<i32>> {
        match self {
            Self::Balanced => None,
            Self::Fixed(assignor) => Some(assignor.partitions()),
        }
    }
}
