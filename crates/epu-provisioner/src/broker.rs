use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use epu_domain::ContextInfo;
use tokio::sync::RwLock;

use crate::error::ProvisionerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    Ok,
    Error,
}

/// Result of polling the broker for one launch's context. Identities are
/// keyed by `node_id` (the original system keys them by contextualization
/// public key; this redesign uses the node id directly since nothing else
/// in this contract needs the distinction).
#[derive(Debug, Clone, Default)]
pub struct ContextQueryResult {
    pub complete: bool,
    pub identities: HashMap<String, IdentityOutcome>,
}

/// Contract surface for the context broker: allocate a context at launch
/// time, then poll it until the post-boot group rendezvous completes.
/// `query_context` distinguishes a transient outage (`BrokerError`, retry
/// next tick) from a permanent failure (`ContextNotFoundError`, fails the
/// whole launch).
#[async_trait]
pub trait ContextBrokerClient: Send + Sync {
    async fn create_context(&self) -> Result<ContextInfo, ProvisionerError>;
    async fn query_context(&self, context_id: &str) -> Result<ContextQueryResult, ProvisionerError>;
}

#[derive(Default)]
struct MockState {
    contexts: HashMap<String, ContextQueryResult>,
    /// context ids that should answer `ContextNotFoundError` instead of a result.
    not_found: std::collections::HashSet<String>,
    next_seq: u64,
}

/// In-memory broker double for tests: contexts are allocated with a
/// sequential id, and a test can push results for a given context id with
/// [`MockBroker::set_result`] before triggering a `query_context` call.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<RwLock<MockState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_result(&self, context_id: &str, result: ContextQueryResult) {
        self.state.write().await.contexts.insert(context_id.to_string(), result);
    }

    pub async fn mark_not_found(&self, context_id: &str) {
        self.state.write().await.not_found.insert(context_id.to_string());
    }
}

#[async_trait]
impl ContextBrokerClient for MockBroker {
    async fn create_context(&self) -> Result<ContextInfo, ProvisionerError> {
        let mut state = self.state.write().await;
        state.next_seq += 1;
        let id = format!("ctx-{}", state.next_seq);
        Ok(ContextInfo {
            uri: format!("mock://broker/{id}"),
            context_id: id,
            broker_uri: "mock://broker".into(),
            secret: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn query_context(&self, context_id: &str) -> Result<ContextQueryResult, ProvisionerError> {
        let state = self.state.read().await;
        if state.not_found.contains(context_id) {
            return Err(ProvisionerError::ContextNotFoundError { context_id: context_id.to_string() });
        }
        Ok(state.contexts.get(context_id).cloned().unwrap_or_default())
    }
}
