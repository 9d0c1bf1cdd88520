//! Aggregate status of NodeNetworkConfigurationPolicies
//!
//! - [`conditions`] decides the cluster-wide verdict from an enactment tally
//! - [`store`] is the optimistic-concurrency seam to wherever policies live
//! - [`updater`] runs the fetch/compute/persist cycle with conflict retries

pub mod conditions;
pub mod store;
pub mod updater;

pub use conditions::{decide, ConditionUpdate, PolicyConditions, PolicyVerdict};
pub use store::{InMemoryPolicyStore, KubePolicyStore, PolicyStore};
pub use updater::PolicyConditionsUpdater;
