//! Read-compute-write cycle for policy status
//!
//! Each attempt walks `Fetch -> Compute -> Persist` over a snapshot read in
//! that same attempt. A conflict on persist throws the computed status away
//! and starts over from `Fetch`, since whatever raced with us may have changed
//! the inputs as well. Any other failure ends the update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, warn, Instrument, Span};

use super::conditions::PolicyVerdict;
use super::store::PolicyStore;
use crate::crd::{NodeNetworkConfigurationEnactment, NodeNetworkConfigurationPolicy};
use crate::enactment;
use crate::node::{eligible_nodes, NodeInventory};
use crate::retry::RetryConfig;
use crate::Error;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What an update does to the policy status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusMutation {
    /// Recompute the aggregate conditions
    Aggregate,
    /// Drop all conditions
    Reset,
}

/// Everything one attempt reads, taken together
struct Snapshot {
    policy: NodeNetworkConfigurationPolicy,
    enactments: Vec<NodeNetworkConfigurationEnactment>,
    eligible_nodes: usize,
}

enum Phase {
    Fetch,
    Compute(Snapshot),
    Persist(NodeNetworkConfigurationPolicy),
}

enum AttemptOutcome {
    Done,
    Conflict(Error),
}

/// Keeps a policy's aggregate conditions in line with its enactments
pub struct PolicyConditionsUpdater {
    store: Arc<dyn PolicyStore>,
    inventory: Arc<dyn NodeInventory>,
    retry: RetryConfig,
    span: Span,
    clock: Clock,
}

impl PolicyConditionsUpdater {
    /// Create an updater with the default conflict budget
    pub fn new(store: Arc<dyn PolicyStore>, inventory: Arc<dyn NodeInventory>) -> Self {
        Self {
            store,
            inventory,
            retry: RetryConfig::default(),
            span: info_span!("policy_conditions"),
            clock: Arc::new(Utc::now),
        }
    }

    /// Override the conflict retry budget
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Emit this updater's events under `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Override the clock used for condition timestamps
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Recompute and persist the aggregate conditions of policy `name`
    pub async fn update(&self, name: &str) -> Result<(), Error> {
        let span = info_span!(parent: &self.span, "update", policy = %name);
        self.execute(name, StatusMutation::Aggregate)
            .instrument(span)
            .await
    }

    /// Clear all conditions of policy `name`
    pub async fn reset(&self, name: &str) -> Result<(), Error> {
        let span = info_span!(parent: &self.span, "reset", policy = %name);
        self.execute(name, StatusMutation::Reset)
            .instrument(span)
            .await
    }

    async fn execute(&self, name: &str, mutation: StatusMutation) -> Result<(), Error> {
        let attempts = self.retry.attempts();
        let mut backoff = self.retry.backoff();
        let mut attempt = 1;

        loop {
            match self.attempt(name, mutation).await? {
                AttemptOutcome::Done => return Ok(()),
                AttemptOutcome::Conflict(err) if attempt < attempts => {
                    info!(attempt, error = %err, "conflict writing policy conditions, retrying");
                    backoff.wait().await;
                    attempt += 1;
                }
                AttemptOutcome::Conflict(err) => {
                    warn!(
                        attempts = attempt,
                        "giving up on policy conditions after repeated conflicts"
                    );
                    return Err(Error::ConflictRetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        name: &str,
        mutation: StatusMutation,
    ) -> Result<AttemptOutcome, Error> {
        let mut phase = Phase::Fetch;
        loop {
            phase = match phase {
                Phase::Fetch => match mutation {
                    StatusMutation::Aggregate => Phase::Compute(self.fetch_snapshot(name).await?),
                    StatusMutation::Reset => {
                        let mut policy = self.fetch_policy(name).await?;
                        policy.conditions_mut().reset();
                        Phase::Persist(policy)
                    }
                },
                Phase::Compute(snapshot) => Phase::Persist(self.compute(snapshot)),
                Phase::Persist(policy) => return self.persist(&policy).await,
            };
        }
    }

    async fn fetch_policy(&self, name: &str) -> Result<NodeNetworkConfigurationPolicy, Error> {
        self.store.get_policy(name).await.map_err(|e| {
            warn!(error = %e, "getting policy failed");
            Error::read("getting policy failed", e)
        })
    }

    async fn fetch_snapshot(&self, name: &str) -> Result<Snapshot, Error> {
        let policy = self.fetch_policy(name).await?;

        let enactments = self.store.list_enactments(name).await.map_err(|e| {
            warn!(error = %e, "getting enactments failed");
            Error::read("getting enactments failed", e)
        })?;

        let eligible = eligible_nodes(self.inventory.as_ref()).await.map_err(|e| {
            warn!(error = %e, "getting nodes running the handler failed");
            Error::read("getting nodes running the handler failed", e)
        })?;

        Ok(Snapshot {
            policy,
            enactments,
            eligible_nodes: eligible.len(),
        })
    }

    fn compute(&self, snapshot: Snapshot) -> NodeNetworkConfigurationPolicy {
        let Snapshot {
            mut policy,
            enactments,
            eligible_nodes,
        } = snapshot;

        let count = enactment::count(&enactments, policy.generation());
        info!(%count, eligible_nodes, "enactments count");

        let verdict = PolicyVerdict::decide(&count, eligible_nodes);
        info!(%verdict, message = %verdict.message(), "setting policy conditions");

        verdict
            .conditions()
            .apply_at(policy.conditions_mut(), (self.clock)());
        policy
    }

    async fn persist(
        &self,
        policy: &NodeNetworkConfigurationPolicy,
    ) -> Result<AttemptOutcome, Error> {
        match self.store.update_policy_status(policy).await {
            Ok(()) => Ok(AttemptOutcome::Done),
            Err(e) if e.is_conflict() => Ok(AttemptOutcome::Conflict(e)),
            Err(e) => {
                error!(error = %e, "failed to update policy conditions");
                Err(Error::write("failed to update policy conditions", e))
            }
        }
    }
}
