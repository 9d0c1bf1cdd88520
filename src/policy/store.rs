//! Optimistic-concurrency access to policies and their enactments
//!
//! Every fetched policy carries its `resourceVersion`; a status write presents
//! it back and is rejected with a conflict if anyone wrote in between.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;

#[cfg(test)]
use mockall::automock;

use crate::crd::{NodeNetworkConfigurationEnactment, NodeNetworkConfigurationPolicy};
use crate::{Error, POLICY_LABEL};

/// Store holding policies and enactments
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch a policy; its `metadata.resourceVersion` is the concurrency token
    async fn get_policy(&self, name: &str) -> Result<NodeNetworkConfigurationPolicy, Error>;

    /// List the enactments labelled with `policy`
    async fn list_enactments(
        &self,
        policy: &str,
    ) -> Result<Vec<NodeNetworkConfigurationEnactment>, Error>;

    /// Replace the policy's status conditions, presenting its resourceVersion
    ///
    /// Returns an error for which [`Error::is_conflict`] is true when the
    /// token is stale.
    async fn update_policy_status(
        &self,
        policy: &NodeNetworkConfigurationPolicy,
    ) -> Result<(), Error>;
}

/// Policy store backed by the Kubernetes API
pub struct KubePolicyStore {
    client: Client,
    field_manager: String,
}

impl KubePolicyStore {
    /// Create a store writing status as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl PolicyStore for KubePolicyStore {
    async fn get_policy(&self, name: &str) -> Result<NodeNetworkConfigurationPolicy, Error> {
        let api: Api<NodeNetworkConfigurationPolicy> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn list_enactments(
        &self,
        policy: &str,
    ) -> Result<Vec<NodeNetworkConfigurationEnactment>, Error> {
        let api: Api<NodeNetworkConfigurationEnactment> = Api::all(self.client.clone());
        let selector = format!("{POLICY_LABEL}={policy}");
        let list = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }

    async fn update_policy_status(
        &self,
        policy: &NodeNetworkConfigurationPolicy,
    ) -> Result<(), Error> {
        let name = policy.name_any();
        let Some(resource_version) = policy.resource_version() else {
            return Err(Error::validation(format!("{name} has no resourceVersion")));
        };

        // A merge patch carrying resourceVersion is rejected with 409 when stale.
        // Conditions are always sent so that an empty list clears them.
        let conditions = policy.conditions().cloned().unwrap_or_default();
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": { "conditions": conditions },
        });

        let api: Api<NodeNetworkConfigurationPolicy> = Api::all(self.client.clone());
        api.patch_status(
            &name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    policies: BTreeMap<String, NodeNetworkConfigurationPolicy>,
    enactments: BTreeMap<String, NodeNetworkConfigurationEnactment>,
    last_version: u64,
    status_writes: usize,
}

impl StoreState {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }
}

/// In-memory store with real resourceVersion checks
///
/// Every write to a policy bumps its resourceVersion, so interleaving writers
/// conflict exactly as they would against the API server.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    state: Mutex<StoreState>,
}

impl InMemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a policy; a missing generation defaults to 1
    pub fn insert_policy(&self, mut policy: NodeNetworkConfigurationPolicy) {
        let mut state = self.state();
        if policy.metadata.generation.is_none() {
            policy.metadata.generation = Some(1);
        }
        policy.metadata.resource_version = Some(state.next_version());
        state.policies.insert(policy.name_any(), policy);
    }

    /// Create or replace an enactment, as a node agent would
    pub fn upsert_enactment(&self, mut enactment: NodeNetworkConfigurationEnactment) {
        let mut state = self.state();
        enactment.metadata.resource_version = Some(state.next_version());
        state.enactments.insert(enactment.name_any(), enactment);
    }

    /// Simulate a spec change: bump generation and resourceVersion
    pub fn bump_generation(&self, name: &str) -> Option<i64> {
        let mut state = self.state();
        let version = state.next_version();
        let policy = state.policies.get_mut(name)?;
        let generation = policy.generation() + 1;
        policy.metadata.generation = Some(generation);
        policy.metadata.resource_version = Some(version);
        Some(generation)
    }

    /// Simulate an unrelated concurrent write that only bumps resourceVersion
    pub fn touch_policy(&self, name: &str) {
        let mut state = self.state();
        let version = state.next_version();
        if let Some(policy) = state.policies.get_mut(name) {
            policy.metadata.resource_version = Some(version);
        }
    }

    /// Current copy of a policy
    pub fn policy(&self, name: &str) -> Option<NodeNetworkConfigurationPolicy> {
        self.state().policies.get(name).cloned()
    }

    /// Number of successful status writes
    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_policy(&self, name: &str) -> Result<NodeNetworkConfigurationPolicy, Error> {
        self.state()
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("policy {name}")))
    }

    async fn list_enactments(
        &self,
        policy: &str,
    ) -> Result<Vec<NodeNetworkConfigurationEnactment>, Error> {
        Ok(self
            .state()
            .enactments
            .values()
            .filter(|e| e.policy_name() == Some(policy))
            .cloned()
            .collect())
    }

    async fn update_policy_status(
        &self,
        policy: &NodeNetworkConfigurationPolicy,
    ) -> Result<(), Error> {
        let name = policy.name_any();
        let mut state = self.state();

        let stored = state
            .policies
            .get(&name)
            .ok_or_else(|| Error::not_found(format!("policy {name}")))?;

        if stored.metadata.resource_version != policy.metadata.resource_version {
            return Err(Error::conflict(format!(
                "policy {name}: resourceVersion {:?} is stale, current is {:?}",
                policy.metadata.resource_version, stored.metadata.resource_version
            )));
        }

        let version = state.next_version();
        if let Some(stored) = state.policies.get_mut(&name) {
            stored.status = policy.status.clone();
            stored.metadata.resource_version = Some(version);
        }
        state.status_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ConditionStatus, ConditionType, NodeNetworkConfigurationPolicySpec};

    fn policy(name: &str) -> NodeNetworkConfigurationPolicy {
        NodeNetworkConfigurationPolicy::new(name, NodeNetworkConfigurationPolicySpec::default())
    }

    #[tokio::test]
    async fn test_write_with_current_version_succeeds() {
        let store = InMemoryPolicyStore::new();
        store.insert_policy(policy("bond0"));

        let mut fetched = store.get_policy("bond0").await.unwrap();
        assert_eq!(fetched.generation(), 1);
        fetched.conditions_mut().set(
            ConditionType::Available,
            ConditionStatus::True,
            "SuccessfullyConfigured",
            "",
        );
        store.update_policy_status(&fetched).await.unwrap();

        let stored = store.policy("bond0").unwrap();
        assert_eq!(stored.conditions().map(|c| c.len()), Some(1));
        assert_ne!(
            stored.metadata.resource_version,
            fetched.metadata.resource_version
        );
        assert_eq!(store.status_writes(), 1);
    }

    /// Story: two writers read the same version; the second write loses
    #[tokio::test]
    async fn story_second_writer_conflicts() {
        let store = InMemoryPolicyStore::new();
        store.insert_policy(policy("bond0"));

        let first = store.get_policy("bond0").await.unwrap();
        let second = store.get_policy("bond0").await.unwrap();

        store.update_policy_status(&first).await.unwrap();
        let err = store.update_policy_status(&second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_touch_invalidates_outstanding_reads() {
        let store = InMemoryPolicyStore::new();
        store.insert_policy(policy("bond0"));
        let fetched = store.get_policy("bond0").await.unwrap();

        store.touch_policy("bond0");
        assert!(store
            .update_policy_status(&fetched)
            .await
            .unwrap_err()
            .is_conflict());
    }

    #[tokio::test]
    async fn test_rejected_writes_do_not_consume_versions() {
        let store = InMemoryPolicyStore::new();
        store.insert_policy(policy("bond0"));
        let stale = store.get_policy("bond0").await.unwrap();
        store.touch_policy("bond0");

        let current = store.get_policy("bond0").await.unwrap();
        assert!(store.update_policy_status(&stale).await.is_err());
        assert!(store.update_policy_status(&policy("ghost")).await.is_err());
        store.update_policy_status(&current).await.unwrap();

        let version = |p: &NodeNetworkConfigurationPolicy| -> u64 {
            p.resource_version().unwrap().parse().unwrap()
        };
        let stored = store.policy("bond0").unwrap();
        assert_eq!(version(&stored), version(&current) + 1);
    }

    #[tokio::test]
    async fn test_enactments_are_selected_by_policy_label() {
        let store = InMemoryPolicyStore::new();
        store.upsert_enactment(NodeNetworkConfigurationEnactment::for_node("n0", "bond0"));
        store.upsert_enactment(NodeNetworkConfigurationEnactment::for_node("n1", "bond0"));
        store.upsert_enactment(NodeNetworkConfigurationEnactment::for_node("n0", "vlan10"));

        let enactments = store.list_enactments("bond0").await.unwrap();
        assert_eq!(enactments.len(), 2);
        assert!(enactments.iter().all(|e| e.policy_name() == Some("bond0")));
    }

    #[tokio::test]
    async fn test_missing_policy_is_not_found() {
        let store = InMemoryPolicyStore::new();
        let err = store.get_policy("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_bump_generation() {
        let store = InMemoryPolicyStore::new();
        store.insert_policy(policy("bond0"));
        assert_eq!(store.bump_generation("bond0"), Some(2));
        assert_eq!(store.bump_generation("missing"), None);
    }
}
