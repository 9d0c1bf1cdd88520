//! `nmstate.io/v1alpha1` resources (served, not stored)
//!
//! Same shape as v1beta1; kept so clients written against the original API
//! keep working.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    DesiredState, NodeNetworkConfigurationEnactmentStatus, NodeNetworkConfigurationPolicyStatus,
};
use super::v1beta1;

/// Specification for a v1alpha1 NodeNetworkConfigurationPolicy
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nmstate.io",
    version = "v1alpha1",
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

/// Specification for a v1alpha1 NodeNetworkConfigurationEnactment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nmstate.io",
    version = "v1alpha1",
    kind = "NodeNetworkConfigurationEnactment",
    plural = "nodenetworkconfigurationenactments",
    shortname = "nnce",
    status = "NodeNetworkConfigurationEnactmentStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].reason"}"#
)]
pub struct NodeNetworkConfigurationEnactmentSpec {}

impl From<NodeNetworkConfigurationPolicySpec> for v1beta1::NodeNetworkConfigurationPolicySpec {
    fn from(spec: NodeNetworkConfigurationPolicySpec) -> Self {
        Self {
            node_selector: spec.node_selector,
            desired_state: spec.desired_state,
        }
    }
}

impl From<v1beta1::NodeNetworkConfigurationPolicySpec> for NodeNetworkConfigurationPolicySpec {
    fn from(spec: v1beta1::NodeNetworkConfigurationPolicySpec) -> Self {
        Self {
            node_selector: spec.node_selector,
            desired_state: spec.desired_state,
        }
    }
}
