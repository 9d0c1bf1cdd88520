//! Which nodes are expected to report an enactment
//!
//! Only nodes that run the handler pod ever write enactments. Users commonly
//! keep the handler off control-plane nodes, so counting every node would
//! leave policies progressing forever.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Source of node and handler-pod placement information
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeInventory: Send + Sync {
    /// Names of every node in the cluster
    async fn node_names(&self) -> Result<Vec<String>, Error>;

    /// Names of the nodes that have a handler pod scheduled on them
    async fn handler_pod_nodes(&self) -> Result<Vec<String>, Error>;
}

/// Node inventory backed by the Kubernetes API
pub struct KubeNodeInventory {
    client: Client,
    handler_selector: String,
}

impl KubeNodeInventory {
    /// Create an inventory that finds handler pods with `handler_selector`
    pub fn new(client: Client, handler_selector: impl Into<String>) -> Self {
        Self {
            client,
            handler_selector: handler_selector.into(),
        }
    }
}

#[async_trait]
impl NodeInventory for KubeNodeInventory {
    async fn node_names(&self) -> Result<Vec<String>, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&ListParams::default()).await?;
        Ok(nodes.items.iter().map(|n| n.name_any()).collect())
    }

    async fn handler_pod_nodes(&self) -> Result<Vec<String>, Error> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = api
            .list(&ListParams::default().labels(&self.handler_selector))
            .await?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.spec.and_then(|s| s.node_name))
            .collect())
    }
}

/// Nodes that exist and run a handler pod
pub fn nodes_running_handler(
    nodes: impl IntoIterator<Item = String>,
    handler_pod_nodes: impl IntoIterator<Item = String>,
) -> BTreeSet<String> {
    let scheduled: BTreeSet<String> = handler_pod_nodes.into_iter().collect();
    nodes
        .into_iter()
        .filter(|node| scheduled.contains(node))
        .collect()
}

/// Nodes expected to report an enactment for every policy
///
/// Any listing error is returned as-is; no partial set is produced.
pub async fn eligible_nodes(inventory: &dyn NodeInventory) -> Result<BTreeSet<String>, Error> {
    let nodes = inventory.node_names().await?;
    let handler_nodes = inventory.handler_pod_nodes().await?;
    Ok(nodes_running_handler(nodes, handler_nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_only_nodes_with_handler_pods_are_eligible() {
        let eligible = nodes_running_handler(
            names(&["master-0", "worker-0", "worker-1"]),
            names(&["worker-0", "worker-1"]),
        );
        assert_eq!(
            eligible.into_iter().collect::<Vec<_>>(),
            names(&["worker-0", "worker-1"])
        );
    }

    /// Story: a pod still bound to a deleted node does not resurrect it
    #[test]
    fn story_pods_on_removed_nodes_are_ignored() {
        let eligible = nodes_running_handler(names(&["worker-0"]), names(&["worker-0", "gone"]));
        assert_eq!(eligible.len(), 1);
        assert!(!eligible.contains("gone"));
    }

    #[test]
    fn test_duplicate_pods_count_once() {
        let eligible =
            nodes_running_handler(names(&["worker-0"]), names(&["worker-0", "worker-0"]));
        assert_eq!(eligible.len(), 1);
    }

    #[tokio::test]
    async fn test_eligible_nodes_combines_both_listings() {
        let mut inventory = MockNodeInventory::new();
        inventory
            .expect_node_names()
            .returning(|| Ok(names(&["a", "b", "c"])));
        inventory
            .expect_handler_pod_nodes()
            .returning(|| Ok(names(&["b", "c"])));

        let eligible = eligible_nodes(&inventory).await.unwrap();
        assert_eq!(eligible.len(), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let mut inventory = MockNodeInventory::new();
        inventory
            .expect_node_names()
            .returning(|| Ok(names(&["a"])));
        inventory
            .expect_handler_pod_nodes()
            .returning(|| Err(Error::store("pods is forbidden")));

        let err = eligible_nodes(&inventory).await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }
}
