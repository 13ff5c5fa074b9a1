pub mod broker;
pub mod cluster_doc;
pub mod dtrs;
pub mod error;
pub mod notifier;
pub mod provisioner;

pub use broker::{ContextBrokerClient, ContextQueryResult, IdentityOutcome, MockBroker};
pub use cluster_doc::{ClusterDocument, Workspace};
pub use dtrs::{DeployableType, DtrsResolver, StaticDtrs};
pub use error::ProvisionerError;
pub use notifier::{NoopNotifier, SubscriberNotifier};
pub use provisioner::Provisioner;
