use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use epu_domain::{DecisionEngineState, NodeId, Site};

use crate::control::{ControlParameters, ControllerCoreControl, LaunchGroupSpec};
use crate::engine::DecisionEngine;
use crate::engines::live_nodes;
use crate::error::ControllerError;
use crate::state::ControllerState;

/// Never terminate a worker within this long of it first being observed
/// live, mirroring the distilled system's `TERMINATE_DELAY_SECS`.
const TERMINATE_DELAY_SECS: i64 = 600;

/// Grounded on the distilled system's queue-length-on-demand policy: track a
/// work queue's depth and keep `min..=max` instances running, scaled to
/// demand. Offline/down workers past the terminate delay are torn down;
/// workers unknown to the queue manager are left alone (the workload
/// manager integration itself is out of scope, per spec — only the
/// worker-status sensor bucket is read).
#[derive(Debug, Clone)]
pub struct QueueLengthEngine {
    allocation: String,
    site: Site,
    deployable_type: String,
    queue_name: String,
    min_instances: u32,
    max_instances: u32,
    first_seen: HashMap<NodeId, DateTime<Utc>>,
}

impl QueueLengthEngine {
    pub fn new() -> Self {
        QueueLengthEngine {
            allocation: String::new(),
            site: Site(String::new()),
            deployable_type: String::new(),
            queue_name: String::new(),
            min_instances: 0,
            max_instances: 0,
            first_seen: HashMap::new(),
        }
    }

    fn load_config(&mut self, config: &serde_json::Value) -> Result<(), ControllerError> {
        let obj = config.as_object().ok_or_else(|| ControllerError::InvalidEngineConfig("expected a JSON object".into()))?;
        self.allocation = field_str(obj, "allocation")?;
        self.site = Site(field_str(obj, "site")?);
        self.deployable_type = field_str(obj, "deployable_type")?;
        self.queue_name = field_str(obj, "queue_name")?;
        self.min_instances = obj.get("min_instances").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        self.max_instances = obj
            .get("max_instances")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ControllerError::InvalidEngineConfig("max_instances is required".into()))? as u32;
        Ok(())
    }
}

fn field_str(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<String, ControllerError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ControllerError::InvalidEngineConfig(format!("{key} is required")))
}

#[async_trait]
impl DecisionEngine for QueueLengthEngine {
    async fn initialize(
        &mut self,
        control: &ControllerCoreControl,
        _state: &ControllerState,
        config: &serde_json::Value,
    ) -> Result<(), ControllerError> {
        self.load_config(config)?;
        control
            .configure(ControlParameters { timed_pulse_irregular_ms: Some(5000), provisioner_vars: None })
            .await;
        Ok(())
    }

    async fn decide(&mut self, control: &ControllerCoreControl, state: &ControllerState) -> Result<(), ControllerError> {
        let now = Utc::now();
        let live = live_nodes(control, state).await?;
        for (id, first_time) in &live {
            self.first_seen.entry(id.clone()).or_insert(*first_time);
        }
        self.first_seen.retain(|id, _| live.iter().any(|(live_id, _)| live_id == id));

        let queued = state
            .get_all_queue_lengths()
            .await
            .into_iter()
            .filter(|history| history.first().map(|s| s.key == self.queue_name).unwrap_or(false))
            .filter_map(|history| history.last().map(|s| s.value))
            .next()
            .unwrap_or(0)
            .max(0) as u32;

        let desired = queued.max(self.min_instances).min(self.max_instances);
        let valid_count = live.len() as u32;

        if valid_count < desired {
            let mut groups = HashMap::new();
            groups.insert(
                "worker".to_string(),
                LaunchGroupSpec { num_instances: desired - valid_count, allocation: self.allocation.clone(), site: self.site.clone() },
            );
            control.launch(&self.deployable_type, groups, None).await?;
            return Ok(());
        }

        if valid_count > desired {
            let surplus = (valid_count - desired) as usize;
            let offline: Vec<NodeId> = state
                .get_all_worker_status()
                .await
                .into_iter()
                .filter_map(|history| history.last().cloned())
                .filter(|s| s.value == "offline" || s.value == "down")
                .filter_map(|s| NodeId::new(s.key).ok())
                .filter(|id| {
                    self.first_seen
                        .get(id)
                        .map(|since| (now - *since).num_seconds() >= TERMINATE_DELAY_SECS)
                        .unwrap_or(false)
                })
                .take(surplus)
                .collect();
            if !offline.is_empty() {
                control.destroy_instances(&offline).await?;
                for id in &offline {
                    self.first_seen.remove(id);
                }
            }
        }
        Ok(())
    }

    async fn reconfigure(&mut self, control: &ControllerCoreControl, config: &serde_json::Value) -> Result<(), ControllerError> {
        self.load_config(config)?;
        control.configure(ControlParameters::default()).await;
        Ok(())
    }

    fn de_state(&self) -> DecisionEngineState {
        if self.max_instances == 0 {
            DecisionEngineState::Unknown
        } else {
            DecisionEngineState::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epu_iaas::{DriverRegistry, MockDriver};
    use epu_provisioner::{MockBroker, NoopNotifier, Provisioner, StaticDtrs};
    use epu_store::InMemoryStore;
    use std::sync::Arc;

    fn sample_config() -> serde_json::Value {
        serde_json::json!({
            "allocation": "small",
            "site": "local",
            "deployable_type": "worker-dt",
            "queue_name": "default",
            "min_instances": 0,
            "max_instances": 5,
        })
    }

    async fn test_control() -> ControllerCoreControl {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let mut registry = DriverRegistry::new();
        registry.register(Site("local".into()), driver);
        let dtrs = Arc::new(StaticDtrs::new());
        dtrs.register(
            "worker-dt",
            epu_provisioner::DeployableType {
                document: r#"<cluster><workspace><name>worker</name><image>i</image><quantity>1</quantity><ctx>c</ctx></workspace></cluster>"#.into(),
                vars: HashMap::new(),
            },
        )
        .await;
        let provisioner = Arc::new(Provisioner::new(
            store,
            Arc::new(registry),
            Arc::new(MockBroker::new()),
            dtrs,
            Arc::new(NoopNotifier),
        ));
        ControllerCoreControl::new(provisioner, ControllerState::new(None), "test-controller")
    }

    #[tokio::test]
    async fn launches_up_to_queue_depth_within_max() {
        let control = test_control().await;
        let state = ControllerState::new(None);
        state.new_queue_length("default", 3, Utc::now()).await;

        let mut engine = QueueLengthEngine::new();
        engine.initialize(&control, &state, &sample_config()).await.unwrap();
        engine.decide(&control, &state).await.unwrap();

        // one launch group of 3 "worker" instances means 3 fresh node ids
        // seeded as REQUESTING in the shared state.
        let all = state.get_all_instance_states().await;
        assert_eq!(all.iter().map(|h| h.len()).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn zero_queue_length_launches_nothing() {
        let control = test_control().await;
        let state = ControllerState::new(None);

        let mut engine = QueueLengthEngine::new();
        engine.initialize(&control, &state, &sample_config()).await.unwrap();
        engine.decide(&control, &state).await.unwrap();

        assert!(state.get_all_instance_states().await.is_empty());
    }
}
