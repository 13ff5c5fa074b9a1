pub mod driver;
pub mod error;
pub mod mock;
pub mod registry;

pub use driver::{Driver, IaasNode, ObservedIaasState};
pub use error::DriverError;
pub use mock::MockDriver;
pub use registry::DriverRegistry;
