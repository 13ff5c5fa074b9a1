use std::collections::HashMap;

use async_trait::async_trait;
use epu_domain::{NodeId, Site};

use crate::error::DriverError;

/// What `create_node` or a subsequent `list_nodes` observes for one IaaS
/// instance. `Unknown` covers the "missing from the list" case the
/// Provisioner's `query_nodes` pass treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedIaasState {
    Pending,
    Running,
    Terminated,
}

/// One instance as reported back by the driver, keyed by the client-chosen
/// `node_id` so the Provisioner can match it 1:1 against its own records.
#[derive(Debug, Clone)]
pub struct IaasNode {
    pub node_id: NodeId,
    pub iaas_id: String,
    pub state: ObservedIaasState,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

/// The IaaS back-end contract: create, list, destroy. Implementations MUST
/// be idempotent on `node_id` — calling `create_node` twice with the same
/// id (e.g. after a crash-restart replay from `Provisioner::recover`) must
/// not create a second instance.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Launch one instance per `node_id`, all on `site`, in a single call.
    /// Returns one `IaasNode` per requested id, in any order.
    async fn create_node(
        &self,
        site: &Site,
        node_ids: &[NodeId],
        allocation: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Vec<IaasNode>, DriverError>;

    /// Look up current state for a set of previously created instances by
    /// their driver-assigned `iaas_id`s. An id absent from the result is
    /// "missing" from the IaaS layer's point of view.
    async fn list_nodes(&self, site: &Site, iaas_ids: &[String]) -> Result<Vec<IaasNode>, DriverError>;

    /// Idempotent: destroying an already-terminated or unknown id succeeds
    /// silently.
    async fn destroy_node(&self, site: &Site, iaas_id: &str) -> Result<(), DriverError>;
}
