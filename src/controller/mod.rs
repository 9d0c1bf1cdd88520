//! Controller for NodeNetworkConfigurationPolicy status
//!
//! Watches policies and their enactments and keeps each policy's aggregate
//! conditions current.

mod policy;

pub use policy::{error_policy, policy_for_enactment, reconcile, run, Context, ControllerConfig};
