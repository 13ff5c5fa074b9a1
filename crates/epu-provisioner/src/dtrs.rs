use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ProvisionerError;

/// A resolved deployable type: the cluster document to launch plus
/// per-node template variables to inject (merged with the caller's
/// `node_id`/`heartbeat_dest` by the Controller at launch time).
#[derive(Debug, Clone, Default)]
pub struct DeployableType {
    pub document: String,
    pub vars: HashMap<String, String>,
}

/// Contract surface for the deployable-type resolver. A lookup failure is
/// always terminal for the request that triggered it.
#[async_trait]
pub trait DtrsResolver: Send + Sync {
    async fn lookup(&self, deployable_type: &str) -> Result<DeployableType, ProvisionerError>;
}

/// Static in-memory resolver for tests and for local/offline deployments
/// where deployable types are preloaded from config rather than resolved
/// from a remote registry.
#[derive(Clone, Default)]
pub struct StaticDtrs {
    types: Arc<RwLock<HashMap<String, DeployableType>>>,
}

impl StaticDtrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, deployable_type: impl Into<String>, dt: DeployableType) {
        self.types.write().await.insert(deployable_type.into(), dt);
    }
}

#[async_trait]
impl DtrsResolver for StaticDtrs {
    async fn lookup(&self, deployable_type: &str) -> Result<DeployableType, ProvisionerError> {
        self.types
            .read()
            .await
            .get(deployable_type)
            .cloned()
            .ok_or_else(|| ProvisionerError::DeployableTypeLookupError {
                deployable_type: deployable_type.to_string(),
                reason: "no deployable type registered with that name".into(),
            })
    }
}
