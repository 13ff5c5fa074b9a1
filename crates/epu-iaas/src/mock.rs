use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use epu_domain::{NodeId, Site};
use tokio::sync::RwLock;
use tracing::debug;

use crate::driver::{Driver, IaasNode, ObservedIaasState};
use crate::error::DriverError;

struct Entry {
    node: IaasNode,
    /// Starts `Pending`, flips to `Running` the first time `list_nodes`
    /// observes it — lets tests exercise the Provisioner's
    /// `Pending -> Started` transition without waiting on real time.
    listed_once: bool,
}

/// In-memory idempotent driver: the default for local development and the
/// backbone of the Provisioner's test suite. `create_node` keyed by
/// `node_id` so replaying the same call (as `recover()` does) never
/// double-provisions.
#[derive(Clone, Default)]
pub struct MockDriver {
    nodes: Arc<RwLock<HashMap<NodeId, Entry>>>,
    /// vars passed to the most recent `create_node` call; test-only window
    /// into what the Provisioner actually sent the driver.
    last_vars: Arc<RwLock<HashMap<String, String>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_vars(&self) -> HashMap<String, String> {
        self.last_vars.read().await.clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn create_node(
        &self,
        site: &Site,
        node_ids: &[NodeId],
        _allocation: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Vec<IaasNode>, DriverError> {
        *self.last_vars.write().await = vars.clone();
        let mut nodes = self.nodes.write().await;
        let mut out = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            let entry = nodes.entry(id.clone()).or_insert_with(|| {
                debug!(node_id = %id, site = %site, "mock driver: create_node");
                Entry {
                    node: IaasNode {
                        node_id: id.clone(),
                        iaas_id: format!("mock-{}", id),
                        state: ObservedIaasState::Pending,
                        public_ip: None,
                        private_ip: None,
                    },
                    listed_once: false,
                }
            });
            out.push(entry.node.clone());
        }
        Ok(out)
    }

    async fn list_nodes(&self, _site: &Site, iaas_ids: &[String]) -> Result<Vec<IaasNode>, DriverError> {
        let mut nodes = self.nodes.write().await;
        let mut out = Vec::new();
        for entry in nodes.values_mut() {
            if !iaas_ids.contains(&entry.node.iaas_id) {
                continue;
            }
            if entry.node.state == ObservedIaasState::Pending {
                if entry.listed_once {
                    entry.node.state = ObservedIaasState::Running;
                    entry.node.public_ip = Some(format!("203.0.113.{}", out.len() + 1));
                    entry.node.private_ip = Some(format!("10.0.0.{}", out.len() + 1));
                } else {
                    entry.listed_once = true;
                }
            }
            out.push(entry.node.clone());
        }
        Ok(out)
    }

    async fn destroy_node(&self, _site: &Site, iaas_id: &str) -> Result<(), DriverError> {
        let mut nodes = self.nodes.write().await;
        if let Some((key, _)) = nodes.iter().find(|(_, e)| e.node.iaas_id == iaas_id) {
            let key = key.clone();
            nodes.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_node_is_idempotent_by_node_id() {
        let driver = MockDriver::new();
        let site = Site("local".into());
        let ids = vec![NodeId::new("n-1").unwrap()];
        let first = driver.create_node(&site, &ids, "small", &HashMap::new()).await.unwrap();
        let second = driver.create_node(&site, &ids, "small", &HashMap::new()).await.unwrap();
        assert_eq!(first[0].iaas_id, second[0].iaas_id);
    }

    #[tokio::test]
    async fn list_nodes_promotes_to_running_on_second_observation() {
        let driver = MockDriver::new();
        let site = Site("local".into());
        let ids = vec![NodeId::new("n-1").unwrap()];
        let created = driver.create_node(&site, &ids, "small", &HashMap::new()).await.unwrap();
        let iaas_id = created[0].iaas_id.clone();

        let first_list = driver.list_nodes(&site, &[iaas_id.clone()]).await.unwrap();
        assert_eq!(first_list[0].state, ObservedIaasState::Pending);

        let second_list = driver.list_nodes(&site, &[iaas_id]).await.unwrap();
        assert_eq!(second_list[0].state, ObservedIaasState::Running);
    }

    #[tokio::test]
    async fn destroy_node_is_idempotent() {
        let driver = MockDriver::new();
        let site = Site("local".into());
        let ids = vec![NodeId::new("n-1").unwrap()];
        let created = driver.create_node(&site, &ids, "small", &HashMap::new()).await.unwrap();
        driver.destroy_node(&site, &created[0].iaas_id).await.unwrap();
        driver.destroy_node(&site, &created[0].iaas_id).await.unwrap();
    }
}
