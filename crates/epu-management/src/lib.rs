pub mod error;
pub mod messages;
pub mod registry;
pub mod router;

pub use error::ManagementError;
pub use messages::{InstanceInfoMessage, SensorInfoMessage};
pub use registry::EpuManagement;
pub use router::MessageRouter;
