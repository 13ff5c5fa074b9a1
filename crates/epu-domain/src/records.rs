use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DefinitionId, DomainId, LaunchId, NodeId, Site};
use crate::state::{InstanceHealthState, InstanceState};

/// Context broker handshake details attached to a launch once allocated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInfo {
    pub uri: String,
    pub context_id: String,
    pub broker_uri: String,
    pub secret: String,
}

/// One `ctx_name` group within a provision request: the client-chosen node
/// ids to launch, the site to launch them on, and the allocation/flavor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroupRequest {
    pub ids: Vec<NodeId>,
    pub site: Site,
    pub allocation: String,
}

/// Input to `Provisioner::prepare_provision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub launch_id: Option<LaunchId>,
    pub deployable_type: String,
    #[serde(default)]
    pub subscribers: Vec<String>,
    /// ctx_name -> group of ids/site/allocation, matching a `<workspace>`
    /// in the resolved cluster document.
    pub nodes: HashMap<String, NodeGroupRequest>,
    /// Launch-wide provisioner variables (e.g. `heartbeat_dest`), merged with
    /// a per-instance `node_id` at `execute_provision` time.
    #[serde(default)]
    pub vars: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchState {
    Requested,
    Pending,
    Running,
    Failed,
    Terminated,
}

/// Aggregate record over a group of nodes launched together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub launch_id: LaunchId,
    pub deployable_type: String,
    pub state: LaunchState,
    /// Raw cluster `<cluster>` XML document this launch was resolved against.
    pub document: String,
    pub context: Option<ContextInfo>,
    pub node_ids: Vec<NodeId>,
    pub subscribers: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Launch-wide provisioner variables carried from the originating
    /// `ProvisionRequest`; merged with a per-instance `node_id` when each
    /// node is created.
    #[serde(default)]
    pub vars: HashMap<String, String>,
    /// Optimistic-concurrency stamp: a write is only accepted if this
    /// matches the revision the store currently holds for `launch_id`.
    #[serde(default)]
    pub revision: u64,
}

/// One virtual machine tracked through its IaaS lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub launch_id: LaunchId,
    pub site: Site,
    pub allocation: String,
    pub ctx_name: String,
    pub state: InstanceState,
    pub state_time: DateTime<Utc>,
    /// Identity returned by the IaaS driver; assigned atomically with the
    /// first `Pending` transition.
    pub iaas_id: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub pending_timestamp: Option<DateTime<Utc>>,
    pub state_desc: Option<String>,
    /// Optimistic-concurrency stamp: a write is only accepted if this
    /// matches the revision the store currently holds for `node_id`.
    #[serde(default)]
    pub revision: u64,
}

impl NodeRecord {
    /// Advance `state`, stamping `state_time`. Caller is responsible for
    /// only ever calling this with a non-decreasing `new_state` (the
    /// monotonicity invariant is enforced by the Provisioner, not here, so
    /// that recovery replay of an already-applied transition is a no-op
    /// rather than a panic).
    pub fn advance(&mut self, new_state: InstanceState, now: DateTime<Utc>) {
        if new_state > self.state {
            self.state = new_state;
            self.state_time = now;
        }
    }

    /// First non-empty IP wins; a subsequently empty reading does not erase
    /// a known IP.
    pub fn update_ips(&mut self, public_ip: Option<String>, private_ip: Option<String>) {
        if let Some(ip) = public_ip.filter(|s| !s.is_empty()) {
            self.public_ip = Some(ip);
        }
        if let Some(ip) = private_ip.filter(|s| !s.is_empty()) {
            self.private_ip = Some(ip);
        }
    }
}

/// A process observed missing by the OU Agent's supervisor poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedProcess {
    pub name: String,
    pub state: String,
    pub statename: String,
    pub exitcode: Option<i32>,
    pub stop_timestamp: Option<i64>,
    pub error: Option<String>,
    /// Attached only on first occurrence of this exact failure tuple.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stderr: Option<String>,
}

impl FailedProcess {
    /// The cache key identifying "the same failure" across heartbeats:
    /// `(name, state, exitcode, stop_timestamp)`.
    pub fn cache_key(&self) -> (String, String, Option<i32>, Option<i64>) {
        (
            self.name.clone(),
            self.state.clone(),
            self.exitcode,
            self.stop_timestamp,
        )
    }
}

/// Heartbeat payload as sent by an OU Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: NodeId,
    pub timestamp: f64,
    pub state: crate::state::HeartbeatState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_processes: Vec<FailedProcess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_error: Option<String>,
}

/// Per-node health classification held by the Health Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub node_id: NodeId,
    pub instance_state: InstanceState,
    pub instance_state_time: DateTime<Utc>,
    pub health: InstanceHealthState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub missing_timeout_start: Option<DateTime<Utc>>,
    pub error_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<FailedProcess>,
    /// Optimistic-concurrency stamp: a write is only accepted if this
    /// matches the revision the store currently holds for `node_id`.
    #[serde(default)]
    pub revision: u64,
}

impl HealthRecord {
    pub fn new(node_id: NodeId, instance_state: InstanceState, now: DateTime<Utc>) -> Self {
        HealthRecord {
            node_id,
            instance_state,
            instance_state_time: now,
            health: InstanceHealthState::Unknown,
            last_heartbeat: None,
            missing_timeout_start: None,
            error_time: None,
            errors: Vec::new(),
            revision: 0,
        }
    }
}

/// Configurable health-classification timeouts, owned by a `DomainDefinition`
/// and threaded into the Health Monitor at Controller construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthTimeouts {
    pub boot_seconds: u64,
    pub missing_seconds: u64,
    pub really_missing_seconds: u64,
    pub zombie_seconds: u64,
}

impl Default for HealthTimeouts {
    fn default() -> Self {
        HealthTimeouts {
            boot_seconds: 120,
            missing_seconds: 120,
            really_missing_seconds: 300,
            zombie_seconds: 120,
        }
    }
}

/// A reusable template: engine choice + engine config + health timeouts.
/// Edits to a definition never retroactively affect domains already created
/// from it — `Domain::config` is a snapshot taken at `add_domain` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub definition_id: DefinitionId,
    pub engine_class: String,
    pub engine_conf: serde_json::Value,
    pub health: HealthTimeouts,
    pub monitor_health: bool,
    /// Optimistic-concurrency stamp: a write is only accepted if this
    /// matches the revision the store currently holds for `definition_id`.
    #[serde(default)]
    pub revision: u64,
}

/// A live elastic group: one definition instantiated with an owner and an
/// override config, driving exactly one Controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub domain_id: DomainId,
    pub owner: String,
    pub definition_id: DefinitionId,
    pub config: serde_json::Value,
    pub subscribers: Vec<String>,
    /// Optimistic-concurrency stamp: a write is only accepted if this
    /// matches the revision the store currently holds for `domain_id`.
    #[serde(default)]
    pub revision: u64,
}
