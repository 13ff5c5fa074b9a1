use chrono::{DateTime, Utc};
use epu_domain::{DomainId, InstanceState, LaunchId, NodeId};
use serde::{Deserialize, Serialize};

/// Durable audit trail of state transitions, used for operator visibility
/// and for recovery diagnostics. Not consulted by the Provisioner's own
/// logic — the node/launch records are the source of truth — but every
/// transition the Provisioner makes is expected to append one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    NodeStateChanged {
        node_id: NodeId,
        launch_id: LaunchId,
        from: InstanceState,
        to: InstanceState,
        at: DateTime<Utc>,
    },
    LaunchStateChanged {
        launch_id: LaunchId,
        at: DateTime<Utc>,
    },
    DomainCreated {
        domain_id: DomainId,
        at: DateTime<Utc>,
    },
    DomainRemoved {
        domain_id: DomainId,
        at: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn launch_id(&self) -> Option<&LaunchId> {
        match self {
            AuditEvent::NodeStateChanged { launch_id, .. } => Some(launch_id),
            AuditEvent::LaunchStateChanged { launch_id, .. } => Some(launch_id),
            _ => None,
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            AuditEvent::NodeStateChanged { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
