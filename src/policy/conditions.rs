//! Cluster-wide verdict for a policy
//!
//! Counts are only meaningful once every eligible node has reported on the
//! current generation, so "still progressing" wins over everything else.
//! Among finished policies, not matching any node is kept apart from failing
//! on some node.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::crd::{ConditionList, ConditionReason, ConditionStatus, ConditionType};
use crate::enactment::EnactmentCount;

/// Aggregate state of a policy across the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// Some eligible node has not finished yet
    Progressing {
        /// Nodes with a final outcome
        finished: usize,
        /// Nodes expected to report
        eligible: usize,
    },
    /// Every node finished and none is selected by the policy
    NotMatching,
    /// At least one selected node failed or aborted
    FailedToConfigure {
        /// Nodes that failed
        failed: usize,
        /// Nodes the policy applies to
        matching: usize,
        /// Nodes that aborted
        aborted: usize,
    },
    /// Every selected node is configured
    Success {
        /// Nodes configured
        available: usize,
    },
}

impl PolicyVerdict {
    /// Decide the verdict from an enactment tally and the eligible node count
    pub fn decide(count: &EnactmentCount, eligible_nodes: usize) -> Self {
        let finished = count.finished();

        if finished < eligible_nodes {
            Self::Progressing {
                finished,
                eligible: eligible_nodes,
            }
        } else if count.matching() == 0 {
            Self::NotMatching
        } else if count.failed > 0 || count.aborted > 0 {
            Self::FailedToConfigure {
                failed: count.failed,
                matching: count.matching(),
                aborted: count.aborted,
            }
        } else {
            Self::Success {
                available: count.available,
            }
        }
    }

    /// Reason written on both conditions
    pub fn reason(&self) -> ConditionReason {
        match self {
            Self::Progressing { .. } => ConditionReason::ConfigurationProgressing,
            Self::NotMatching => ConditionReason::ConfigurationNoMatchingNode,
            Self::FailedToConfigure { .. } => ConditionReason::FailedToConfigure,
            Self::Success { .. } => ConditionReason::SuccessfullyConfigured,
        }
    }

    /// Human readable summary
    pub fn message(&self) -> String {
        match *self {
            Self::Progressing { finished, eligible } => {
                format!("Policy is progressing {finished}/{eligible} nodes finished")
            }
            Self::NotMatching => "Policy does not match any node".to_string(),
            Self::FailedToConfigure {
                failed,
                matching,
                aborted,
            } => {
                let mut message = format!("{failed}/{matching} nodes failed to configure");
                if aborted > 0 {
                    message.push_str(&format!(", {aborted} nodes aborted configuration"));
                }
                message
            }
            Self::Success { available } => {
                format!("{available}/{available} nodes successfully configured")
            }
        }
    }

    /// The Degraded/Available pair this verdict writes
    pub fn conditions(&self) -> PolicyConditions {
        let reason = self.reason();
        let message = self.message();

        let (degraded, available) = match self {
            Self::Progressing { .. } => (
                (ConditionStatus::Unknown, String::new()),
                (ConditionStatus::Unknown, message),
            ),
            Self::NotMatching => (
                (ConditionStatus::False, message.clone()),
                (ConditionStatus::True, message),
            ),
            Self::FailedToConfigure { .. } => (
                (ConditionStatus::True, message),
                (ConditionStatus::False, String::new()),
            ),
            Self::Success { .. } => (
                (ConditionStatus::False, String::new()),
                (ConditionStatus::True, message),
            ),
        };

        PolicyConditions {
            degraded: ConditionUpdate {
                type_: ConditionType::Degraded,
                status: degraded.0,
                reason,
                message: degraded.1,
            },
            available: ConditionUpdate {
                type_: ConditionType::Available,
                status: available.0,
                reason,
                message: available.1,
            },
        }
    }
}

impl fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progressing { .. } => write!(f, "Progressing"),
            Self::NotMatching => write!(f, "NotMatching"),
            Self::FailedToConfigure { .. } => write!(f, "FailedToConfigure"),
            Self::Success { .. } => write!(f, "Success"),
        }
    }
}

/// One condition write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionUpdate {
    /// Condition type
    pub type_: ConditionType,
    /// New status
    pub status: ConditionStatus,
    /// New reason
    pub reason: ConditionReason,
    /// New message
    pub message: String,
}

/// The aggregate condition pair for a policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyConditions {
    /// Degraded condition
    pub degraded: ConditionUpdate,
    /// Available condition
    pub available: ConditionUpdate,
}

impl PolicyConditions {
    /// Write both conditions (Degraded first) as of `now`
    pub fn apply_at(&self, conditions: &mut ConditionList, now: DateTime<Utc>) {
        for update in [&self.degraded, &self.available] {
            conditions.set_at(
                update.type_,
                update.status,
                update.reason,
                update.message.as_str(),
                now,
            );
        }
    }
}

/// Decide the aggregate condition pair for a tally and eligible node count
pub fn decide(count: &EnactmentCount, eligible_nodes: usize) -> PolicyConditions {
    PolicyVerdict::decide(count, eligible_nodes).conditions()
}
