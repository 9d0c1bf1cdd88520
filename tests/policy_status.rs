//! End-to-end policy status aggregation against the in-memory store
//!
//! These tests drive the public API only: agents write enactments, the
//! updater folds them into policy conditions, and concurrent writers race
//! with it through real resourceVersion checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use knmstate::crd::{
    ConditionList, ConditionReason, ConditionStatus, ConditionType,
    NodeNetworkConfigurationEnactment, NodeNetworkConfigurationEnactmentStatus,
    NodeNetworkConfigurationPolicy, NodeNetworkConfigurationPolicySpec,
};
use knmstate::enactment;
use knmstate::node::NodeInventory;
use knmstate::policy::{InMemoryPolicyStore, PolicyConditionsUpdater, PolicyStore};
use knmstate::retry::RetryConfig;
use knmstate::Error;

// =============================================================================
// Fixtures
// =============================================================================

/// Fixed cluster layout: every node, and the ones running a handler pod
struct StaticInventory {
    nodes: Vec<String>,
    handler_nodes: Vec<String>,
}

impl StaticInventory {
    fn new(nodes: &[&str], handler_nodes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            handler_nodes: handler_nodes.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn everywhere(nodes: &[&str]) -> Arc<Self> {
        Self::new(nodes, nodes)
    }
}

#[async_trait]
impl NodeInventory for StaticInventory {
    async fn node_names(&self) -> Result<Vec<String>, Error> {
        Ok(self.nodes.clone())
    }

    async fn handler_pod_nodes(&self) -> Result<Vec<String>, Error> {
        Ok(self.handler_nodes.clone())
    }
}

/// Store whose first status write loses a race with a node agent
///
/// Just before the write lands, the agent on `node` reports success and some
/// other writer touches the policy, so the write comes back as a conflict.
struct RacingStore {
    inner: Arc<InMemoryPolicyStore>,
    node: String,
    raced: AtomicBool,
}

#[async_trait]
impl PolicyStore for RacingStore {
    async fn get_policy(&self, name: &str) -> Result<NodeNetworkConfigurationPolicy, Error> {
        self.inner.get_policy(name).await
    }

    async fn list_enactments(
        &self,
        policy: &str,
    ) -> Result<Vec<NodeNetworkConfigurationEnactment>, Error> {
        self.inner.list_enactments(policy).await
    }

    async fn update_policy_status(
        &self,
        policy: &NodeNetworkConfigurationPolicy,
    ) -> Result<(), Error> {
        let name = policy.metadata.name.clone().unwrap_or_default();
        if !self.raced.swap(true, Ordering::SeqCst) {
            let generation = policy.metadata.generation.unwrap_or(1);
            self.inner.upsert_enactment(reported(
                &self.node,
                &name,
                generation,
                enactment::set_success,
            ));
            self.inner.touch_policy(&name);
        }
        self.inner.update_policy_status(policy).await
    }
}

fn policy(name: &str) -> NodeNetworkConfigurationPolicy {
    NodeNetworkConfigurationPolicy::new(name, NodeNetworkConfigurationPolicySpec::default())
}

fn reported(
    node: &str,
    policy: &str,
    generation: i64,
    set: fn(&mut ConditionList, &str),
) -> NodeNetworkConfigurationEnactment {
    let mut enactment = NodeNetworkConfigurationEnactment::for_node(node, policy);
    let mut conditions = ConditionList::new();
    set(&mut conditions, "");
    enactment.status = Some(NodeNetworkConfigurationEnactmentStatus {
        policy_generation: generation,
        conditions,
        ..Default::default()
    });
    enactment
}

fn updater(
    store: Arc<dyn PolicyStore>,
    inventory: Arc<StaticInventory>,
) -> PolicyConditionsUpdater {
    PolicyConditionsUpdater::new(store, inventory).with_retry(RetryConfig::immediate(5))
}

fn condition(
    store: &InMemoryPolicyStore,
    policy: &str,
    type_: ConditionType,
) -> (ConditionStatus, String, String) {
    let policy = store.policy(policy).expect("policy exists");
    let condition = policy
        .conditions()
        .and_then(|c| c.find(type_))
        .cloned()
        .expect("condition is set");
    (condition.status, condition.reason, condition.message)
}

// =============================================================================
// Aggregation
// =============================================================================

/// Story: a bridge policy rolls out across three workers
///
/// The policy stays progressing until every worker has reported, then turns
/// available; the control-plane node never runs a handler and is never waited on.
#[tokio::test]
async fn story_policy_rolls_out_across_workers() {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.insert_policy(policy("br1"));
    let inventory = StaticInventory::new(
        &["master-0", "worker-0", "worker-1", "worker-2"],
        &["worker-0", "worker-1", "worker-2"],
    );
    let updater = updater(store.clone(), inventory);

    store.upsert_enactment(reported("worker-0", "br1", 1, enactment::set_success));
    store.upsert_enactment(reported("worker-1", "br1", 1, enactment::set_progressing));
    updater.update("br1").await.unwrap();

    assert_eq!(
        condition(&store, "br1", ConditionType::Available),
        (
            ConditionStatus::Unknown,
            ConditionReason::ConfigurationProgressing.to_string(),
            "Policy is progressing 1/3 nodes finished".to_string()
        )
    );
    assert_eq!(
        condition(&store, "br1", ConditionType::Degraded).0,
        ConditionStatus::Unknown
    );

    store.upsert_enactment(reported("worker-1", "br1", 1, enactment::set_success));
    store.upsert_enactment(reported("worker-2", "br1", 1, enactment::set_success));
    updater.update("br1").await.unwrap();

    assert_eq!(
        condition(&store, "br1", ConditionType::Available),
        (
            ConditionStatus::True,
            ConditionReason::SuccessfullyConfigured.to_string(),
            "3/3 nodes successfully configured".to_string()
        )
    );
    assert_eq!(
        condition(&store, "br1", ConditionType::Degraded),
        (
            ConditionStatus::False,
            ConditionReason::SuccessfullyConfigured.to_string(),
            String::new()
        )
    );
}

#[tokio::test]
async fn test_failures_and_aborts_degrade_the_policy() {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.insert_policy(policy("bond0"));
    let reports: [(&str, fn(&mut ConditionList, &str)); 4] = [
        ("n0", enactment::set_success),
        ("n1", enactment::set_failed_to_configure),
        ("n2", enactment::set_aborted),
        ("n3", enactment::set_node_selector_not_matching),
    ];
    for (node, set) in reports {
        store.upsert_enactment(reported(node, "bond0", 1, set));
    }

    let inventory = StaticInventory::everywhere(&["n0", "n1", "n2", "n3"]);
    updater(store.clone(), inventory)
        .update("bond0")
        .await
        .unwrap();

    assert_eq!(
        condition(&store, "bond0", ConditionType::Degraded),
        (
            ConditionStatus::True,
            ConditionReason::FailedToConfigure.to_string(),
            "1/3 nodes failed to configure, 1 nodes aborted configuration".to_string()
        )
    );
    assert_eq!(
        condition(&store, "bond0", ConditionType::Available),
        (
            ConditionStatus::False,
            ConditionReason::FailedToConfigure.to_string(),
            String::new()
        )
    );
}

#[tokio::test]
async fn test_policy_selecting_no_node_is_available() {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.insert_policy(policy("vlan10"));
    for node in ["n0", "n1"] {
        store.upsert_enactment(reported(
            node,
            "vlan10",
            1,
            enactment::set_node_selector_not_matching,
        ));
    }

    updater(store.clone(), StaticInventory::everywhere(&["n0", "n1"]))
        .update("vlan10")
        .await
        .unwrap();

    let expected = "Policy does not match any node".to_string();
    assert_eq!(
        condition(&store, "vlan10", ConditionType::Available),
        (
            ConditionStatus::True,
            ConditionReason::ConfigurationNoMatchingNode.to_string(),
            expected.clone()
        )
    );
    assert_eq!(
        condition(&store, "vlan10", ConditionType::Degraded),
        (
            ConditionStatus::False,
            ConditionReason::ConfigurationNoMatchingNode.to_string(),
            expected
        )
    );
}

/// Story: a spec edit sends the policy back to progressing
///
/// Reports for the previous generation are ignored until the agents catch up.
#[tokio::test]
async fn story_new_generation_waits_for_fresh_reports() {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.insert_policy(policy("br1"));
    store.upsert_enactment(reported("n0", "br1", 1, enactment::set_success));
    let updater = updater(store.clone(), StaticInventory::everywhere(&["n0"]));

    updater.update("br1").await.unwrap();
    assert_eq!(
        condition(&store, "br1", ConditionType::Available).0,
        ConditionStatus::True
    );

    let generation = store.bump_generation("br1").unwrap();
    updater.update("br1").await.unwrap();
    assert_eq!(
        condition(&store, "br1", ConditionType::Available),
        (
            ConditionStatus::Unknown,
            ConditionReason::ConfigurationProgressing.to_string(),
            "Policy is progressing 0/1 nodes finished".to_string()
        )
    );

    store.upsert_enactment(reported("n0", "br1", generation, enactment::set_success));
    updater.update("br1").await.unwrap();
    assert_eq!(
        condition(&store, "br1", ConditionType::Available).0,
        ConditionStatus::True
    );
}

// =============================================================================
// Concurrency
// =============================================================================

/// Story: an agent reports while the status write is in flight
///
/// The stale write is rejected, and the retry recomputes from the newer
/// enactments instead of re-sending the old result.
#[tokio::test]
async fn story_conflicting_write_is_recomputed_from_fresh_reads() {
    let inner = Arc::new(InMemoryPolicyStore::new());
    inner.insert_policy(policy("br1"));
    inner.upsert_enactment(reported("n0", "br1", 1, enactment::set_success));

    let store = Arc::new(RacingStore {
        inner: inner.clone(),
        node: "n1".to_string(),
        raced: AtomicBool::new(false),
    });

    updater(store, StaticInventory::everywhere(&["n0", "n1"]))
        .update("br1")
        .await
        .unwrap();

    assert_eq!(inner.status_writes(), 1);
    assert_eq!(
        condition(&inner, "br1", ConditionType::Available),
        (
            ConditionStatus::True,
            ConditionReason::SuccessfullyConfigured.to_string(),
            "2/2 nodes successfully configured".to_string()
        )
    );
}

#[tokio::test]
async fn test_single_attempt_budget_surfaces_the_conflict() {
    let inner = Arc::new(InMemoryPolicyStore::new());
    inner.insert_policy(policy("br1"));

    let store = Arc::new(RacingStore {
        inner: inner.clone(),
        node: "n0".to_string(),
        raced: AtomicBool::new(false),
    });

    let err = PolicyConditionsUpdater::new(store, StaticInventory::everywhere(&["n0"]))
        .with_retry(RetryConfig::immediate(1))
        .update("br1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ConflictRetriesExhausted { attempts: 1, .. }
    ));
    assert_eq!(inner.status_writes(), 0);
}

// =============================================================================
// Reset
// =============================================================================

#[tokio::test]
async fn test_reset_then_update_rebuilds_conditions() {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.insert_policy(policy("br1"));
    store.upsert_enactment(reported("n0", "br1", 1, enactment::set_success));
    let updater = updater(store.clone(), StaticInventory::everywhere(&["n0"]));

    updater.update("br1").await.unwrap();
    updater.reset("br1").await.unwrap();
    assert!(store
        .policy("br1")
        .unwrap()
        .conditions()
        .map_or(true, |c| c.is_empty()));

    updater.update("br1").await.unwrap();
    let conditions = store.policy("br1").unwrap().conditions().cloned().unwrap();
    let types: Vec<_> = conditions.iter().map(|c| c.type_.as_str()).collect();
    assert_eq!(types, vec!["Degraded", "Available"]);
}

#[tokio::test]
async fn test_missing_policy_is_a_read_failure() {
    let store = Arc::new(InMemoryPolicyStore::new());
    let err = updater(store.clone(), StaticInventory::everywhere(&["n0"]))
        .update("ghost")
        .await
        .unwrap_err();

    assert!(err.is_read_failure());
    assert_eq!(store.status_writes(), 0);
}
