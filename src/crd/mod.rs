//! Custom Resource Definitions for node network configuration
//!
//! Two API versions are served. `v1beta1` is the storage version and the one
//! the rest of the crate works with; `v1alpha1` has the same shape.

mod conditions;
mod types;
pub mod v1alpha1;
pub mod v1beta1;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

pub use conditions::{Condition, ConditionList, ConditionReason, ConditionStatus, ConditionType};
pub use types::{
    DesiredState, NodeNetworkConfigurationEnactmentStatus, NodeNetworkConfigurationPolicyStatus,
};
pub use v1beta1::{
    NodeNetworkConfigurationEnactment, NodeNetworkConfigurationEnactmentSpec,
    NodeNetworkConfigurationPolicy, NodeNetworkConfigurationPolicySpec,
};

use crate::Error;

/// Version every object is persisted as
pub const STORAGE_VERSION: &str = "v1beta1";

/// Name of the enactment recording `node`'s realization of `policy`
pub fn enactment_name(node: &str, policy: &str) -> String {
    format!("{node}.{policy}")
}

/// Multi-version CRDs for policies and enactments
///
/// The storage version additionally preserves unknown top-level fields so
/// objects written by newer clients survive a round trip.
pub fn crds() -> Result<Vec<CustomResourceDefinition>, Error> {
    let policy = merge_crds(
        vec![
            v1alpha1::NodeNetworkConfigurationPolicy::crd(),
            v1beta1::NodeNetworkConfigurationPolicy::crd(),
        ],
        STORAGE_VERSION,
    )
    .map_err(|e| Error::validation(format!("merging policy CRD versions: {e}")))?;

    let enactment = merge_crds(
        vec![
            v1alpha1::NodeNetworkConfigurationEnactment::crd(),
            v1beta1::NodeNetworkConfigurationEnactment::crd(),
        ],
        STORAGE_VERSION,
    )
    .map_err(|e| Error::validation(format!("merging enactment CRD versions: {e}")))?;

    Ok(vec![
        preserve_unknown_fields(policy),
        preserve_unknown_fields(enactment),
    ])
}

fn preserve_unknown_fields(mut crd: CustomResourceDefinition) -> CustomResourceDefinition {
    let storage_schema = crd
        .spec
        .versions
        .iter_mut()
        .filter(|v| v.storage)
        .filter_map(|v| v.schema.as_mut())
        .filter_map(|s| s.open_api_v3_schema.as_mut());

    for schema in storage_schema {
        schema.x_kubernetes_preserve_unknown_fields = Some(true);
    }
    crd
}

/// Render all CRDs as a multi-document YAML stream
pub fn crds_yaml() -> Result<String, Error> {
    let docs = crds()?
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::serialization(e.to_string()))?;
    Ok(docs.join("---\n"))
}
