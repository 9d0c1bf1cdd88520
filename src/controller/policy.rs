//! NodeNetworkConfigurationPolicy controller
//!
//! Reconciles a policy whenever it changes or one of its enactments does,
//! recomputing the aggregate conditions. The runtime never runs two
//! reconciliations of the same policy at once, so conflicts only come from
//! writers outside this process.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use crate::crd::{NodeNetworkConfigurationEnactment, NodeNetworkConfigurationPolicy};
use crate::node::{KubeNodeInventory, NodeInventory};
use crate::policy::{KubePolicyStore, PolicyConditionsUpdater, PolicyStore};
use crate::retry::RetryConfig;
use crate::{Error, DEFAULT_HANDLER_SELECTOR, FIELD_MANAGER};

/// Settings for the policy controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Label selector for handler pods
    pub handler_selector: String,
    /// Field manager used for status writes
    pub field_manager: String,
    /// Conflict retry budget per reconciliation
    pub retry: RetryConfig,
    /// Periodic resync of every policy; catches handler pods moving between nodes
    pub resync_interval: Duration,
    /// Delay before retrying a failed reconciliation
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            handler_selector: DEFAULT_HANDLER_SELECTOR.to_string(),
            field_manager: FIELD_MANAGER.to_string(),
            retry: RetryConfig::default(),
            resync_interval: Duration::from_secs(300),
            error_requeue: Duration::from_secs(5),
        }
    }
}

/// Controller context shared across reconciliations
pub struct Context {
    /// Aggregates and persists policy conditions
    pub updater: PolicyConditionsUpdater,
    /// Periodic resync interval
    pub resync_interval: Duration,
    /// Requeue delay after an error
    pub error_requeue: Duration,
}

impl Context {
    /// Build a context talking to the Kubernetes API
    pub fn new(client: Client, config: &ControllerConfig) -> Self {
        let store: Arc<dyn PolicyStore> =
            Arc::new(KubePolicyStore::new(client.clone(), &config.field_manager));
        let inventory: Arc<dyn NodeInventory> =
            Arc::new(KubeNodeInventory::new(client, &config.handler_selector));
        Self::with_backends(store, inventory, config)
    }

    /// Build a context over arbitrary store and inventory implementations
    pub fn with_backends(
        store: Arc<dyn PolicyStore>,
        inventory: Arc<dyn NodeInventory>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            updater: PolicyConditionsUpdater::new(store, inventory)
                .with_retry(config.retry.clone()),
            resync_interval: config.resync_interval,
            error_requeue: config.error_requeue,
        }
    }
}

/// Reconcile a NodeNetworkConfigurationPolicy
#[instrument(skip(policy, ctx), fields(policy = %policy.name_any()))]
pub async fn reconcile(
    policy: Arc<NodeNetworkConfigurationPolicy>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    if policy.metadata.deletion_timestamp.is_some() {
        debug!("policy is being deleted, skipping");
        return Ok(Action::await_change());
    }

    ctx.updater.update(&policy.name_any()).await?;
    Ok(Action::requeue(ctx.resync_interval))
}

/// Requeue a policy whose reconciliation failed
pub fn error_policy(
    policy: Arc<NodeNetworkConfigurationPolicy>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    error!(
        error = %error,
        policy = %policy.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

/// Map an enactment change to the policy it reports on
pub fn policy_for_enactment(
    enactment: &NodeNetworkConfigurationEnactment,
) -> Option<ObjectRef<NodeNetworkConfigurationPolicy>> {
    enactment.policy_name().map(ObjectRef::new)
}

/// Run the policy controller until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) -> Result<(), Error> {
    let policies: Api<NodeNetworkConfigurationPolicy> = Api::all(client.clone());
    let enactments: Api<NodeNetworkConfigurationEnactment> = Api::all(client.clone());

    // Fail fast if the CRDs are missing instead of watching forever
    policies.list(&Default::default()).await?;

    let ctx = Arc::new(Context::new(client, &config));
    info!(
        handler_selector = %config.handler_selector,
        max_attempts = config.retry.max_attempts,
        "starting policy controller"
    );

    Controller::new(policies, WatcherConfig::default())
        .watches(enactments, WatcherConfig::default(), |enactment| {
            policy_for_enactment(&enactment)
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((policy, action)) => {
                    debug!(policy = %policy.name, ?action, "policy reconciliation completed");
                }
                Err(e) => {
                    error!(error = ?e, "policy reconciliation error");
                }
            }
        })
        .await;

    info!("policy controller shutting down");
    Ok(())
}
