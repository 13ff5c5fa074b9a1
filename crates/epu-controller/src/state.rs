use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use epu_domain::{HealthRecord, InstanceState, NodeId};
use tokio::sync::RwLock;

use crate::health::HealthMonitor;

/// One observation bucketed by `(type, key)`, mirroring the original
/// system's `StateItem{type, key, time, value}`. `key` is the node id for
/// instance-state samples, the queue name for queue-length samples.
#[derive(Debug, Clone)]
pub struct StateItem<V> {
    pub key: String,
    pub time: DateTime<Utc>,
    pub value: V,
}

#[derive(Default)]
struct Inner {
    instance_states: HashMap<String, Vec<StateItem<InstanceState>>>,
    queue_lengths: HashMap<String, Vec<StateItem<i64>>>,
    worker_status: HashMap<String, Vec<StateItem<String>>>,
}

/// Everything a decision engine can read through `get_all`/`get`, plus the
/// append-only sensor history a Controller accumulates between decide
/// ticks. Cheap to clone (`Arc` handle) so it can be handed to an engine
/// invocation without borrowing the Controller itself.
#[derive(Clone)]
pub struct ControllerState {
    inner: Arc<RwLock<Inner>>,
    health: Option<Arc<HealthMonitor>>,
}

impl ControllerState {
    pub fn new(health: Option<Arc<HealthMonitor>>) -> Self {
        ControllerState {
            inner: Arc::new(RwLock::new(Inner::default())),
            health,
        }
    }

    pub fn health_monitor(&self) -> Option<Arc<HealthMonitor>> {
        self.health.clone()
    }

    /// Record a new instance-state sample, and forward it to the health
    /// monitor so it can track boot grace and out-of-contact timing.
    pub async fn new_instance_state(&self, node_id: &NodeId, state: InstanceState, at: DateTime<Utc>) {
        self.inner
            .write()
            .await
            .instance_states
            .entry(node_id.as_str().to_string())
            .or_default()
            .push(StateItem { key: node_id.as_str().to_string(), time: at, value: state });

        if let Some(health) = &self.health {
            health.node_state(node_id, state, at).await;
        }
    }

    /// Seed a freshly chosen node id as `REQUESTING`, called by
    /// `ControllerCoreControl::launch` before the provision request is sent.
    pub async fn new_launch(&self, node_id: &NodeId, at: DateTime<Utc>) {
        self.new_instance_state(node_id, InstanceState::Requesting, at).await;
    }

    pub async fn new_queue_length(&self, queue_name: &str, length: i64, at: DateTime<Utc>) {
        self.inner
            .write()
            .await
            .queue_lengths
            .entry(queue_name.to_string())
            .or_default()
            .push(StateItem { key: queue_name.to_string(), time: at, value: length });
    }

    pub async fn new_worker_status(&self, queue_name: &str, status: String, at: DateTime<Utc>) {
        self.inner
            .write()
            .await
            .worker_status
            .entry(queue_name.to_string())
            .or_default()
            .push(StateItem { key: queue_name.to_string(), time: at, value: status });
    }

    /// Reclassify health against wall time. Called once per decide tick,
    /// before the engine runs.
    pub async fn update(&self, now: DateTime<Utc>) {
        if let Some(health) = &self.health {
            health.update(now).await;
        }
    }

    pub async fn get_all_instance_states(&self) -> Vec<Vec<StateItem<InstanceState>>> {
        self.inner.read().await.instance_states.values().cloned().collect()
    }

    pub async fn get_instance_states(&self, node_id: &str) -> Vec<StateItem<InstanceState>> {
        self.inner
            .read()
            .await
            .instance_states
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_all_queue_lengths(&self) -> Vec<Vec<StateItem<i64>>> {
        self.inner.read().await.queue_lengths.values().cloned().collect()
    }

    pub async fn get_queue_length(&self, queue_name: &str) -> Vec<StateItem<i64>> {
        self.inner.read().await.queue_lengths.get(queue_name).cloned().unwrap_or_default()
    }

    pub async fn get_all_worker_status(&self) -> Vec<Vec<StateItem<String>>> {
        self.inner.read().await.worker_status.values().cloned().collect()
    }

    pub async fn get_all_instance_health(&self) -> Vec<HealthRecord> {
        match &self.health {
            Some(health) => health.get_all().await,
            None => Vec::new(),
        }
    }

    pub async fn get_instance_health(&self, node_id: &NodeId) -> Option<HealthRecord> {
        match &self.health {
            Some(health) => health.get(node_id).await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instance_state_history_is_append_only_per_key() {
        let state = ControllerState::new(None);
        let id = NodeId::new("n-1").unwrap();
        let now = Utc::now();
        state.new_instance_state(&id, InstanceState::Requesting, now).await;
        state.new_instance_state(&id, InstanceState::Pending, now).await;

        let history = state.get_instance_states("n-1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, InstanceState::Requesting);
        assert_eq!(history[1].value, InstanceState::Pending);
    }

    #[tokio::test]
    async fn no_health_monitor_reports_empty_health() {
        let state = ControllerState::new(None);
        assert!(state.get_all_instance_health().await.is_empty());
    }
}
