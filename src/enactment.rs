//! Per-node enactment reports: classification and condition setters
//!
//! Node agents describe how far they got with a policy through the
//! `Available`/`Degraded` pair on their enactment. [`count`] folds those
//! reports into an [`EnactmentCount`] for one policy generation; the `set_*`
//! functions are the agent-side vocabulary that produces them.

use std::fmt;

use crate::crd::{
    ConditionList, ConditionReason, ConditionStatus, ConditionType,
    NodeNetworkConfigurationEnactment,
};

/// Where a single current-generation enactment stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnactmentOutcome {
    /// Configured successfully
    Available,
    /// Configuration failed
    Failed,
    /// The policy does not select this node
    NotMatching,
    /// Configuration was aborted
    Aborted,
    /// Anything else: still working, or nothing reported yet
    Progressing,
}

impl EnactmentOutcome {
    /// Classify a node's conditions by its `Available` condition
    pub fn classify(conditions: Option<&ConditionList>) -> Self {
        let Some(available) = conditions.and_then(|c| c.find(ConditionType::Available)) else {
            return Self::Progressing;
        };

        match available.known_reason() {
            Some(ConditionReason::SuccessfullyConfigured)
                if available.status == ConditionStatus::True =>
            {
                Self::Available
            }
            Some(ConditionReason::FailedToConfigure) => Self::Failed,
            Some(ConditionReason::ConfigurationNoMatchingNode) => Self::NotMatching,
            Some(ConditionReason::ConfigurationAborted) => Self::Aborted,
            _ => Self::Progressing,
        }
    }
}

/// Tally of enactments reporting on one policy generation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnactmentCount {
    /// Successfully configured
    pub available: usize,
    /// Failed to configure
    pub failed: usize,
    /// Not selected by the policy
    pub not_matching: usize,
    /// Aborted configuration
    pub aborted: usize,
    /// Still configuring
    pub progressing: usize,
}

impl EnactmentCount {
    /// Record one outcome
    pub fn record(&mut self, outcome: EnactmentOutcome) {
        match outcome {
            EnactmentOutcome::Available => self.available += 1,
            EnactmentOutcome::Failed => self.failed += 1,
            EnactmentOutcome::NotMatching => self.not_matching += 1,
            EnactmentOutcome::Aborted => self.aborted += 1,
            EnactmentOutcome::Progressing => self.progressing += 1,
        }
    }

    /// Enactments counted at all
    pub fn total(&self) -> usize {
        self.available + self.failed + self.not_matching + self.aborted + self.progressing
    }

    /// Nodes the policy actually applies to
    pub fn matching(&self) -> usize {
        self.total() - self.not_matching
    }

    /// Nodes that reached a final outcome
    pub fn finished(&self) -> usize {
        self.available + self.failed + self.not_matching + self.aborted
    }
}

impl fmt::Display for EnactmentCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "available: {}, failed: {}, notMatching: {}, aborted: {}, progressing: {}, matching: {}",
            self.available,
            self.failed,
            self.not_matching,
            self.aborted,
            self.progressing,
            self.matching()
        )
    }
}

impl FromIterator<EnactmentOutcome> for EnactmentCount {
    fn from_iter<I: IntoIterator<Item = EnactmentOutcome>>(iter: I) -> Self {
        let mut count = Self::default();
        for outcome in iter {
            count.record(outcome);
        }
        count
    }
}

/// Count enactments that report on `generation`
///
/// Reports for any other generation are stale and left out of every bucket.
pub fn count<'a, I>(enactments: I, generation: i64) -> EnactmentCount
where
    I: IntoIterator<Item = &'a NodeNetworkConfigurationEnactment>,
{
    enactments
        .into_iter()
        .filter(|e| e.observed_generation() == Some(generation))
        .map(|e| EnactmentOutcome::classify(e.conditions()))
        .collect()
}

/// Node started applying the policy
pub fn set_progressing(conditions: &mut ConditionList, message: &str) {
    conditions.set(
        ConditionType::Available,
        ConditionStatus::Unknown,
        ConditionReason::ConfigurationProgressing,
        message,
    );
    conditions.set(
        ConditionType::Degraded,
        ConditionStatus::Unknown,
        ConditionReason::ConfigurationProgressing,
        "",
    );
}

/// Node applied the policy
pub fn set_success(conditions: &mut ConditionList, message: &str) {
    conditions.set(
        ConditionType::Available,
        ConditionStatus::True,
        ConditionReason::SuccessfullyConfigured,
        message,
    );
    conditions.set(
        ConditionType::Degraded,
        ConditionStatus::False,
        ConditionReason::SuccessfullyConfigured,
        "",
    );
}

/// Node failed to apply the policy
pub fn set_failed_to_configure(conditions: &mut ConditionList, message: &str) {
    conditions.set(
        ConditionType::Available,
        ConditionStatus::False,
        ConditionReason::FailedToConfigure,
        "",
    );
    conditions.set(
        ConditionType::Degraded,
        ConditionStatus::True,
        ConditionReason::FailedToConfigure,
        message,
    );
}

/// Policy's node selector does not select this node
pub fn set_node_selector_not_matching(conditions: &mut ConditionList, message: &str) {
    conditions.set(
        ConditionType::Available,
        ConditionStatus::True,
        ConditionReason::ConfigurationNoMatchingNode,
        message,
    );
    conditions.set(
        ConditionType::Degraded,
        ConditionStatus::False,
        ConditionReason::ConfigurationNoMatchingNode,
        message,
    );
}

/// Node stopped applying the policy before finishing
pub fn set_aborted(conditions: &mut ConditionList, message: &str) {
    conditions.set(
        ConditionType::Available,
        ConditionStatus::False,
        ConditionReason::ConfigurationAborted,
        "",
    );
    conditions.set(
        ConditionType::Degraded,
        ConditionStatus::True,
        ConditionReason::ConfigurationAborted,
        message,
    );
}
