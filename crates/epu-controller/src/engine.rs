use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use epu_domain::DecisionEngineState;

use crate::control::ControllerCoreControl;
use crate::error::ControllerError;
use crate::state::ControllerState;

/// Pluggable policy contract. Engines are pure policy: they read only
/// through `ControllerState`'s getters and act only through
/// `ControllerCoreControl`'s `launch`/`destroy_instances`/`configure`.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn initialize(
        &mut self,
        control: &ControllerCoreControl,
        state: &ControllerState,
        config: &serde_json::Value,
    ) -> Result<(), ControllerError>;

    async fn decide(&mut self, control: &ControllerCoreControl, state: &ControllerState) -> Result<(), ControllerError>;

    async fn reconfigure(&mut self, control: &ControllerCoreControl, config: &serde_json::Value) -> Result<(), ControllerError>;

    /// Coarse operator-visible status. Default `UNKNOWN` matches engines
    /// that don't track one.
    fn de_state(&self) -> DecisionEngineState {
        DecisionEngineState::Unknown
    }
}

type EngineFactory = Arc<dyn Fn() -> Box<dyn DecisionEngine> + Send + Sync>;

/// Dispatch-by-name registry: a `DomainDefinition.engine_class` string
/// selects which factory builds the engine instance backing that domain's
/// Controller.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: EngineFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DecisionEngine>, ControllerError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ControllerError::UnknownEngine(name.to_string()))
    }
}
