use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use epu_controller::ControllerCore;
use epu_domain::{DomainId, Heartbeat, NodeId};
use epu_store::StateStore;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::ManagementError;
use crate::messages::{InstanceInfoMessage, SensorInfoMessage};

/// Routes heartbeat/instance-info/sensor-info messages to the Controller
/// owning the node they reference. The store is the source of truth for
/// the node → domain association: a node's launch's `subscribers[0]` is the
/// domain id the Controller registered at launch time, so no separate
/// routing index needs to be kept in sync.
pub struct MessageRouter {
    store: Arc<dyn StateStore>,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        MessageRouter { store }
    }

    async fn domain_for_node(&self, node_id: &NodeId) -> Result<Option<DomainId>, ManagementError> {
        let Some(node) = self.store.get_node(node_id).await? else { return Ok(None) };
        let Some(launch) = self.store.get_launch(&node.launch_id).await? else { return Ok(None) };
        Ok(launch.subscribers.first().and_then(|s| DomainId::new(s.clone()).ok()))
    }

    pub async fn route_heartbeat(
        &self,
        controllers: &RwLock<HashMap<DomainId, Arc<ControllerCore>>>,
        heartbeat: Heartbeat,
    ) -> Result<(), ManagementError> {
        let Some(domain_id) = self.domain_for_node(&heartbeat.node_id).await? else {
            warn!(node_id = %heartbeat.node_id, "heartbeat from node with no known domain, dropping");
            return Ok(());
        };
        let controllers = controllers.read().await;
        let Some(controller) = controllers.get(&domain_id) else {
            warn!(node_id = %heartbeat.node_id, domain_id = %domain_id, "heartbeat for domain with no live controller, dropping");
            return Ok(());
        };
        if let Some(health) = controller.state().health_monitor() {
            health.new_heartbeat(&heartbeat, Utc::now()).await;
        }
        Ok(())
    }

    pub async fn route_instance_info(
        &self,
        controllers: &RwLock<HashMap<DomainId, Arc<ControllerCore>>>,
        msg: InstanceInfoMessage,
    ) -> Result<(), ManagementError> {
        let Some(domain_id) = self.domain_for_node(&msg.node_id).await? else {
            warn!(node_id = %msg.node_id, "instance_info from node with no known domain, dropping");
            return Ok(());
        };
        let controllers = controllers.read().await;
        if let Some(controller) = controllers.get(&domain_id) {
            controller.state().new_instance_state(&msg.node_id, msg.state, Utc::now()).await;
        }
        Ok(())
    }

    pub async fn route_sensor_info(
        &self,
        controllers: &RwLock<HashMap<DomainId, Arc<ControllerCore>>>,
        msg: SensorInfoMessage,
    ) -> Result<(), ManagementError> {
        match msg {
            SensorInfoMessage::InstanceState { node_id, state } => {
                self.route_instance_info(controllers, InstanceInfoMessage { node_id, state }).await
            }
            SensorInfoMessage::QueueLength { queue_name, queue_length } => {
                // Queue-length samples aren't node-scoped, so they can't be
                // routed by node → domain lookup; every live controller
                // that cares filters by its own configured queue name.
                let controllers = controllers.read().await;
                let now = Utc::now();
                for controller in controllers.values() {
                    controller.state().new_queue_length(&queue_name, queue_length, now).await;
                }
                Ok(())
            }
        }
    }
}
