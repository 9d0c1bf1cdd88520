//! Kubernetes-style status conditions shared by policies and enactments
//!
//! Both CRDs report their state through the same two condition types,
//! `Available` and `Degraded`. A [`ConditionList`] holds at most one condition
//! per type and is only mutated through [`ConditionList::set`], which keeps the
//! transition and heartbeat timestamps honest.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition types the aggregation reads and writes
///
/// Agents may report further types; those stay plain strings on the wire and
/// are carried along untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// The configuration is in place (or does not apply)
    Available,
    /// The configuration failed somewhere
    Degraded,
}

impl ConditionType {
    /// The wire representation of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Degraded => "Degraded",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConditionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(Self::Available),
            "Degraded" => Ok(Self::Degraded),
            _ => Err(Error::validation(format!("unknown condition type: {s}"))),
        }
    }
}

/// Recognized condition reasons
///
/// Conditions store the reason as a plain string so that reasons written by
/// newer agents still deserialize; this enum names the values the aggregation
/// understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    /// Configuration has not finished yet
    ConfigurationProgressing,
    /// Configuration was applied successfully
    SuccessfullyConfigured,
    /// The node selector does not select this node
    ConfigurationNoMatchingNode,
    /// Applying the configuration failed
    FailedToConfigure,
    /// Configuration was aborted before it finished
    ConfigurationAborted,
}

impl ConditionReason {
    /// All recognized reasons
    pub const ALL: [ConditionReason; 5] = [
        Self::ConfigurationProgressing,
        Self::SuccessfullyConfigured,
        Self::ConfigurationNoMatchingNode,
        Self::FailedToConfigure,
        Self::ConfigurationAborted,
    ];

    /// The wire representation of this reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationProgressing => "ConfigurationProgressing",
            Self::SuccessfullyConfigured => "SuccessfullyConfigured",
            Self::ConfigurationNoMatchingNode => "ConfigurationNoMatchingNode",
            Self::FailedToConfigure => "FailedToConfigure",
            Self::ConfigurationAborted => "ConfigurationAborted",
        }
    }
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConditionReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown condition reason: {s}")))
    }
}

impl From<ConditionReason> for String {
    fn from(reason: ConditionReason) -> Self {
        reason.as_str().to_string()
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition; types other than [`ConditionType`] are kept as-is
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,

    /// Last time the condition was written, changed or not
    pub last_heartbeat_time: DateTime<Utc>,
}

impl Condition {
    /// The type, if it is one the aggregation recognizes
    pub fn known_type(&self) -> Option<ConditionType> {
        self.type_.parse().ok()
    }

    /// The reason, if it is one the aggregation recognizes
    pub fn known_reason(&self) -> Option<ConditionReason> {
        self.reason.parse().ok()
    }

    fn is(&self, type_: ConditionType) -> bool {
        self.type_ == type_.as_str()
    }
}

/// Ordered set of conditions, unique by type
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct ConditionList(Vec<Condition>);

impl ConditionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a condition using the current time
    pub fn set(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.set_at(type_, status, reason, message, Utc::now());
    }

    /// Upsert a condition as of `now`
    ///
    /// An existing condition of the same type is updated in place and keeps
    /// its position; its transition time moves only if the status changed.
    /// The heartbeat always moves.
    pub fn set_at(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let reason = reason.into();
        let message = message.into();

        match self.0.iter_mut().find(|c| c.is(type_)) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = now;
                }
                existing.status = status;
                existing.reason = reason;
                existing.message = message;
                existing.last_heartbeat_time = now;
            }
            None => self.0.push(Condition {
                type_: type_.as_str().to_string(),
                status,
                reason,
                message,
                last_transition_time: now,
                last_heartbeat_time: now,
            }),
        }
    }

    /// Find the condition of the given type
    pub fn find(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.is(type_))
    }

    /// Drop every condition
    pub fn reset(&mut self) {
        self.0.clear();
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no condition is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ConditionList {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
