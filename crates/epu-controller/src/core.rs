use std::sync::Arc;

use chrono::Utc;
use epu_domain::DecisionEngineState;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::control::ControllerCoreControl;
use crate::engine::DecisionEngine;
use crate::error::ControllerError;
use crate::state::ControllerState;

/// Ties together sensor ingestion, the Control facade, and the engine
/// runtime. `decide` and `reconfigure` are mutually exclusive via a
/// single-permit gate (`Mutex` standing in for the original
/// `DeferredSemaphore(1)`); a decide tick that arrives while one is already
/// in flight is dropped rather than queued, matching the non-reentrant
/// timer requirement in the concurrency model.
pub struct ControllerCore {
    control: Arc<ControllerCoreControl>,
    state: ControllerState,
    engine: Mutex<Box<dyn DecisionEngine>>,
}

impl ControllerCore {
    pub fn new(control: Arc<ControllerCoreControl>, state: ControllerState, engine: Box<dyn DecisionEngine>) -> Self {
        ControllerCore { control, state, engine: Mutex::new(engine) }
    }

    pub fn control(&self) -> Arc<ControllerCoreControl> {
        self.control.clone()
    }

    pub fn state(&self) -> ControllerState {
        self.state.clone()
    }

    pub async fn initialize(&self, config: serde_json::Value) -> Result<(), ControllerError> {
        let mut engine = self.engine.lock().await;
        engine.initialize(&self.control, &self.state, &config).await
    }

    /// Age health against wall time, then invoke the engine. Returns `Ok(())`
    /// without calling the engine if a decide/reconfigure is already in
    /// flight.
    pub async fn run_decide(&self) -> Result<(), ControllerError> {
        self.state.update(Utc::now()).await;

        let Ok(mut engine) = self.engine.try_lock() else {
            debug!("decide tick dropped: previous decide/reconfigure still in flight");
            return Ok(());
        };
        engine.decide(&self.control, &self.state).await
    }

    /// Unlike `run_decide`, a reconfigure is a discrete admin action rather
    /// than a periodic tick, so it waits for the permit instead of dropping.
    pub async fn run_reconfigure(&self, config: serde_json::Value) -> Result<(), ControllerError> {
        let mut engine = self.engine.lock().await;
        engine.reconfigure(&self.control, &config).await
    }

    pub async fn de_state(&self) -> DecisionEngineState {
        match self.engine.try_lock() {
            Ok(engine) => engine.de_state(),
            Err(_) => {
                warn!("de_state queried while engine busy, reporting UNKNOWN");
                DecisionEngineState::Unknown
            }
        }
    }
}
