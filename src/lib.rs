//! knmstate - cluster-wide status for node network configuration policies
//!
//! Node agents apply a NodeNetworkConfigurationPolicy on their own node and
//! report the outcome in a per-node NodeNetworkConfigurationEnactment. This
//! crate folds those reports into the policy's `Available`/`Degraded`
//! conditions and persists them against an optimistic-concurrency store.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions and status conditions
//! - [`enactment`] - Classification of per-node reports
//! - [`node`] - Which nodes are expected to report
//! - [`policy`] - Verdict, store seam and the retrying status updater
//! - [`controller`] - kube-runtime controller driving updates
//! - [`retry`] - Conflict retry budget and backoff
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod enactment;
pub mod error;
pub mod node;
pub mod policy;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label on an enactment naming the policy it reports on
pub const POLICY_LABEL: &str = "nmstate.io/policy";

/// Label on an enactment naming the node it comes from
pub const NODE_LABEL: &str = "nmstate.io/node";

/// Label selector matching handler pods
///
/// A node is only expected to report if one of these pods runs on it.
pub const DEFAULT_HANDLER_SELECTOR: &str = "component=kubernetes-nmstate-handler";

/// Field manager for status writes
pub const FIELD_MANAGER: &str = "knmstate-policy-controller";
