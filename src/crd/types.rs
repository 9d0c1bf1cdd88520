//! Status and spec building blocks shared by every served API version

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::ConditionList;

/// Opaque network state, preserved verbatim
///
/// The aggregation never looks inside; the schema marks it with
/// `x-kubernetes-preserve-unknown-fields` so the API server keeps it intact.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct DesiredState(pub serde_json::Value);

impl DesiredState {
    /// True when no state was provided
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for DesiredState {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl JsonSchema for DesiredState {
    fn schema_name() -> String {
        "DesiredState".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut extensions = BTreeMap::new();
        extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );

        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some("Desired network state (nmstate format)".to_string()),
                ..Default::default()
            })),
            extensions: extensions.into_iter().collect(),
            ..Default::default()
        })
    }
}

/// Status of a NodeNetworkConfigurationPolicy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeNetworkConfigurationPolicyStatus {
    /// Aggregate conditions across every node the policy applies to
    #[serde(default, skip_serializing_if = "ConditionList::is_empty")]
    pub conditions: ConditionList,
}

/// Status of a NodeNetworkConfigurationEnactment, written by the node agent
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeNetworkConfigurationEnactmentStatus {
    /// State the agent rendered for this node
    #[serde(default, skip_serializing_if = "DesiredState::is_empty")]
    pub desired_state: DesiredState,

    /// Policy generation this report refers to
    #[serde(default)]
    pub policy_generation: i64,

    /// Per-node conditions
    #[serde(default, skip_serializing_if = "ConditionList::is_empty")]
    pub conditions: ConditionList,
}
