//! `nmstate.io/v1beta1` resources (storage version)

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    DesiredState, NodeNetworkConfigurationEnactmentStatus, NodeNetworkConfigurationPolicyStatus,
};
use crate::{NODE_LABEL, POLICY_LABEL};

/// Specification for a NodeNetworkConfigurationPolicy
///
/// The policy is a cluster-wide template: every node selected by
/// `node_selector` renders `desired_state` and reports back through its own
/// NodeNetworkConfigurationEnactment.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nmstate.io",
    version = "v1beta1",
    kind = "NodeNetworkConfigurationPolicy",
    plural = "nodenetworkconfigurationpolicies",
    shortname = "nncp",
    status = "NodeNetworkConfigurationPolicyStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeNetworkConfigurationPolicySpec {
    /// Labels a node must carry for the policy to apply; empty selects every node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Network state to apply on selected nodes
    #[serde(default, skip_serializing_if = "DesiredState::is_empty")]
    pub desired_state: DesiredState,
}

impl NodeNetworkConfigurationPolicy {
    /// Current spec generation; zero until the API server assigns one
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// Status conditions, creating an empty status if needed
    pub fn conditions_mut(&mut self) -> &mut super::ConditionList {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    /// Status conditions, if any were written
    pub fn conditions(&self) -> Option<&super::ConditionList> {
        self.status.as_ref().map(|s| &s.conditions)
    }
}

/// Specification for a NodeNetworkConfigurationEnactment
///
/// Enactments are status-only objects; identity comes from the
/// `nmstate.io/node` and `nmstate.io/policy` labels.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nmstate.io",
    version = "v1beta1",
    kind = "NodeNetworkConfigurationEnactment",
    plural = "nodenetworkconfigurationenactments",
    shortname = "nnce",
    status = "NodeNetworkConfigurationEnactmentStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].reason"}"#
)]
pub struct NodeNetworkConfigurationEnactmentSpec {}

impl NodeNetworkConfigurationEnactment {
    /// Build an enactment for `node` realizing `policy`, named `<node>.<policy>`
    pub fn for_node(node: &str, policy: &str) -> Self {
        let mut enactment = Self::new(
            &super::enactment_name(node, policy),
            NodeNetworkConfigurationEnactmentSpec::default(),
        );
        let labels = enactment.labels_mut();
        labels.insert(NODE_LABEL.to_string(), node.to_string());
        labels.insert(POLICY_LABEL.to_string(), policy.to_string());
        enactment
    }

    /// Node this report comes from
    pub fn node_name(&self) -> Option<&str> {
        self.labels().get(NODE_LABEL).map(String::as_str)
    }

    /// Policy this report refers to
    pub fn policy_name(&self) -> Option<&str> {
        self.labels().get(POLICY_LABEL).map(String::as_str)
    }

    /// Policy generation the agent evaluated, if it reported at all
    pub fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().map(|s| s.policy_generation)
    }

    /// Per-node conditions, if the agent reported any
    pub fn conditions(&self) -> Option<&super::ConditionList> {
        self.status.as_ref().map(|s| &s.conditions)
    }
}
