use epu_domain::{InstanceState, NodeId};
use serde::{Deserialize, Serialize};

/// `instance_info` message: a raw instance-state observation forwarded to
/// EPU Management from outside the Provisioner's own subscription (e.g. a
/// direct IaaS-layer probe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfoMessage {
    pub node_id: NodeId,
    pub state: InstanceState,
}

/// `sensor_info` dispatches on shape: a `node_id` makes it an instance-state
/// event, a `queue_name` makes it a queue-length sample. Anything matching
/// neither is logged and dropped by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorInfoMessage {
    InstanceState { node_id: NodeId, state: InstanceState },
    QueueLength { queue_name: String, queue_length: i64 },
}
