use std::collections::HashMap;

use async_trait::async_trait;
use epu_domain::{DecisionEngineState, Site};

use crate::control::{ControlParameters, ControllerCoreControl, LaunchGroupSpec};
use crate::engine::DecisionEngine;
use crate::engines::live_nodes;
use crate::error::ControllerError;
use crate::state::ControllerState;

/// The distilled system's simplest decision engine shape: maintain exactly
/// `desired_instances` nodes from static config, with no sensor dependency.
/// Exists mainly to exercise the name-based engine registry with a second,
/// trivially different implementation.
#[derive(Debug, Clone)]
pub struct FixedSizeEngine {
    allocation: String,
    site: Site,
    deployable_type: String,
    desired_instances: u32,
}

impl FixedSizeEngine {
    pub fn new() -> Self {
        FixedSizeEngine {
            allocation: String::new(),
            site: Site(String::new()),
            deployable_type: String::new(),
            desired_instances: 0,
        }
    }

    fn load_config(&mut self, config: &serde_json::Value) -> Result<(), ControllerError> {
        let obj = config.as_object().ok_or_else(|| ControllerError::InvalidEngineConfig("expected a JSON object".into()))?;
        self.allocation = obj
            .get("allocation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControllerError::InvalidEngineConfig("allocation is required".into()))?
            .to_string();
        self.site = Site(
            obj.get("site")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ControllerError::InvalidEngineConfig("site is required".into()))?
                .to_string(),
        );
        self.deployable_type = obj
            .get("deployable_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ControllerError::InvalidEngineConfig("deployable_type is required".into()))?
            .to_string();
        self.desired_instances = obj
            .get("desired_instances")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ControllerError::InvalidEngineConfig("desired_instances is required".into()))? as u32;
        Ok(())
    }
}

#[async_trait]
impl DecisionEngine for FixedSizeEngine {
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
        let live = live_nodes(control, state).await?;
        let valid_count = live.len() as u32;

        if valid_count < self.desired_instances {
            let mut groups = HashMap::new();
            groups.insert(
                "worker".to_string(),
                LaunchGroupSpec {
                    num_instances: self.desired_instances - valid_count,
                    allocation: self.allocation.clone(),
                    site: self.site.clone(),
                },
            );
            control.launch(&self.deployable_type, groups, None).await?;
        } else if valid_count > self.desired_instances {
            let surplus = (valid_count - self.desired_instances) as usize;
            let victims: Vec<_> = live.into_iter().take(surplus).map(|(id, _)| id).collect();
            control.destroy_instances(&victims).await?;
        }
        Ok(())
    }

    async fn reconfigure(&mut self, control: &ControllerCoreControl, config: &serde_json::Value) -> Result<(), ControllerError> {
        self.load_config(config)?;
        control.configure(ControlParameters::default()).await;
        Ok(())
    }

    fn de_state(&self) -> DecisionEngineState {
        DecisionEngineState::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epu_iaas::{DriverRegistry, MockDriver};
    use epu_provisioner::{DeployableType, MockBroker, NoopNotifier, Provisioner, StaticDtrs};
    use epu_store::InMemoryStore;
    use std::sync::Arc;

    fn config(n: u64) -> serde_json::Value {
        serde_json::json!({ "allocation": "small", "site": "local", "deployable_type": "worker-dt", "desired_instances": n })
    }

    async fn test_control() -> ControllerCoreControl {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let mut registry = DriverRegistry::new();
        registry.register(Site("local".into()), driver);
        let dtrs = Arc::new(StaticDtrs::new());
        dtrs.register(
            "worker-dt",
            DeployableType {
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
    async fn launches_to_reach_desired_size_from_empty() {
        let control = test_control().await;
        let state = ControllerState::new(None);
        let mut engine = FixedSizeEngine::new();
        engine.initialize(&control, &state, &config(2)).await.unwrap();
        engine.decide(&control, &state).await.unwrap();

        let total: usize = state.get_all_instance_states().await.iter().map(|h| h.len()).sum();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn second_decide_is_a_no_op_once_at_target_size() {
        let control = test_control().await;
        let state = ControllerState::new(None);
        let mut engine = FixedSizeEngine::new();
        engine.initialize(&control, &state, &config(1)).await.unwrap();
        engine.decide(&control, &state).await.unwrap();
        engine.decide(&control, &state).await.unwrap();

        // only one node's history exists; no second launch was issued.
        let histories = state.get_all_instance_states().await;
        assert_eq!(histories.len(), 1);
    }
}
