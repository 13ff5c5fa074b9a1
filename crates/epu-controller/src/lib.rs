pub mod control;
pub mod core;
pub mod engine;
pub mod engines;
pub mod error;
pub mod health;
pub mod state;

pub use control::{ControlParameters, ControllerCoreControl, LaunchGroupSpec};
pub use core::ControllerCore;
pub use engine::{DecisionEngine, EngineRegistry};
pub use engines::{FixedSizeEngine, QueueLengthEngine};
pub use error::ControllerError;
pub use health::HealthMonitor;
pub use state::{ControllerState, StateItem};
