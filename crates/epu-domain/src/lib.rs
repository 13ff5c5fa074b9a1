pub mod error;
pub mod ids;
pub mod records;
pub mod state;

pub use error::DomainError;
pub use ids::{DefinitionId, DomainId, LaunchId, NodeId, Site};
pub use records::{
    ContextInfo, Domain, DomainDefinition, FailedProcess, Heartbeat, HealthRecord, HealthTimeouts,
    LaunchRecord, LaunchState, NodeGroupRequest, NodeRecord, ProvisionRequest,
};
pub use state::{DecisionEngineState, HeartbeatState, InstanceHealthState, InstanceState};
