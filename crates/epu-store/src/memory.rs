use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use epu_domain::{
    DefinitionId, Domain, DomainDefinition, DomainId, HealthRecord, LaunchId, LaunchRecord, NodeId,
    NodeRecord,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::events::AuditEvent;
use crate::store::StateStore;

#[derive(Default)]
struct Inner {
    launches: HashMap<LaunchId, LaunchRecord>,
    nodes: HashMap<NodeId, NodeRecord>,
    health: HashMap<NodeId, HealthRecord>,
    domains: HashMap<DomainId, Domain>,
    definitions: HashMap<DefinitionId, DomainDefinition>,
    events: Vec<AuditEvent>,
}

/// Volatile store backing local development and tests. Not durable across
/// process restart — `recover()` against this store only recovers from
/// within-process state loss, never a real crash.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A record absent from the store accepts any incoming revision (fresh
/// insert, stamped to revision 0). A record already present requires the
/// incoming revision to match, then advances by one.
fn next_revision(existing: Option<u64>, incoming: u64, holder: impl Into<String>) -> Result<u64, StoreError> {
    match existing {
        None => Ok(0),
        Some(current) if current == incoming => Ok(current + 1),
        Some(_) => Err(StoreError::WriteConflict { holder: holder.into() }),
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_launch(&self, id: &LaunchId) -> Result<Option<LaunchRecord>, StoreError> {
        Ok(self.inner.read().await.launches.get(id).cloned())
    }

    async fn list_launches(&self) -> Result<Vec<LaunchRecord>, StoreError> {
        Ok(self.inner.read().await.launches.values().cloned().collect())
    }

    async fn upsert_launch(&self, mut launch: LaunchRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner.launches.get(&launch.launch_id).map(|l| l.revision);
        launch.revision = next_revision(existing, launch.revision, launch.launch_id.to_string())?;
        inner.launches.insert(launch.launch_id.clone(), launch);
        Ok(())
    }

    async fn delete_launch(&self, id: &LaunchId) -> Result<(), StoreError> {
        self.inner.write().await.launches.remove(id);
        Ok(())
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self.inner.read().await.nodes.get(id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self.inner.read().await.nodes.values().cloned().collect())
    }

    async fn list_nodes_by_launch(&self, launch_id: &LaunchId) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .nodes
            .values()
            .filter(|n| &n.launch_id == launch_id)
            .cloned()
            .collect())
    }

    async fn upsert_node(&self, mut node: NodeRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner.nodes.get(&node.node_id).map(|n| n.revision);
        node.revision = next_revision(existing, node.revision, node.node_id.to_string())?;
        inner.nodes.insert(node.node_id.clone(), node);
        Ok(())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.write().await.nodes.remove(id);
        Ok(())
    }

    async fn get_health(&self, id: &NodeId) -> Result<Option<HealthRecord>, StoreError> {
        Ok(self.inner.read().await.health.get(id).cloned())
    }

    async fn list_health(&self) -> Result<Vec<HealthRecord>, StoreError> {
        Ok(self.inner.read().await.health.values().cloned().collect())
    }

    async fn upsert_health(&self, mut health: HealthRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner.health.get(&health.node_id).map(|h| h.revision);
        health.revision = next_revision(existing, health.revision, health.node_id.to_string())?;
        inner.health.insert(health.node_id.clone(), health);
        Ok(())
    }

    async fn delete_health(&self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.write().await.health.remove(id);
        Ok(())
    }

    async fn get_domain(&self, id: &DomainId) -> Result<Option<Domain>, StoreError> {
        Ok(self.inner.read().await.domains.get(id).cloned())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, StoreError> {
        Ok(self.inner.read().await.domains.values().cloned().collect())
    }

    async fn upsert_domain(&self, mut domain: Domain) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner.domains.get(&domain.domain_id).map(|d| d.revision);
        domain.revision = next_revision(existing, domain.revision, domain.domain_id.to_string())?;
        inner.domains.insert(domain.domain_id.clone(), domain);
        Ok(())
    }

    async fn delete_domain(&self, id: &DomainId) -> Result<(), StoreError> {
        self.inner.write().await.domains.remove(id);
        Ok(())
    }

    async fn get_domain_definition(&self, id: &DefinitionId) -> Result<Option<DomainDefinition>, StoreError> {
        Ok(self.inner.read().await.definitions.get(id).cloned())
    }

    async fn list_domain_definitions(&self) -> Result<Vec<DomainDefinition>, StoreError> {
        Ok(self.inner.read().await.definitions.values().cloned().collect())
    }

    async fn upsert_domain_definition(&self, mut def: DomainDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let existing = inner.definitions.get(&def.definition_id).map(|d| d.revision);
        def.revision = next_revision(existing, def.revision, def.definition_id.to_string())?;
        inner.definitions.insert(def.definition_id.clone(), def);
        Ok(())
    }

    async fn delete_domain_definition(&self, id: &DefinitionId) -> Result<(), StoreError> {
        self.inner.write().await.definitions.remove(id);
        Ok(())
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event);
        Ok(())
    }

    async fn list_events(&self, launch_id: Option<&LaunchId>) -> Result<Vec<AuditEvent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(match launch_id {
            Some(id) => inner
                .events
                .iter()
                .filter(|e| e.launch_id() == Some(id))
                .cloned()
                .collect(),
            None => inner.events.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use epu_domain::LaunchState;

    fn sample_launch(id: &str) -> LaunchRecord {
        LaunchRecord {
            launch_id: LaunchId::new(id).unwrap(),
            deployable_type: "dt".into(),
            state: LaunchState::Requested,
            document: "<cluster/>".into(),
            context: None,
            node_ids: vec![],
            subscribers: vec![],
            created_at: Utc::now(),
            vars: HashMap::new(),
            revision: 0,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let store = InMemoryStore::new();
        let launch = sample_launch("l-1");
        store.upsert_launch(launch.clone()).await.unwrap();
        let got = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(got.deployable_type, "dt");
    }

    #[tokio::test]
    async fn list_launches_reflects_all_upserts() {
        let store = InMemoryStore::new();
        store.upsert_launch(sample_launch("l-1")).await.unwrap();
        store.upsert_launch(sample_launch("l-2")).await.unwrap();
        assert_eq!(store.list_launches().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_launch_removes_it() {
        let store = InMemoryStore::new();
        let launch = sample_launch("l-1");
        store.upsert_launch(launch.clone()).await.unwrap();
        store.delete_launch(&launch.launch_id).await.unwrap();
        assert!(store.get_launch(&launch.launch_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_launch_advances_revision_on_each_write() {
        let store = InMemoryStore::new();
        let launch = sample_launch("l-1");
        store.upsert_launch(launch.clone()).await.unwrap();
        let got = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(got.revision, 0);

        store.upsert_launch(got.clone()).await.unwrap();
        let got = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(got.revision, 1);
    }

    #[tokio::test]
    async fn upsert_launch_rejects_stale_revision() {
        let store = InMemoryStore::new();
        let launch = sample_launch("l-1");
        store.upsert_launch(launch.clone()).await.unwrap();

        // `launch` still carries revision 0, but the store already advanced
        // to 0 -> stored, so a second blind write with the same stale copy
        // after a concurrent update must conflict.
        let got = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        store.upsert_launch(got).await.unwrap(); // advances store to revision 1

        let err = store.upsert_launch(launch).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn events_filtered_by_launch() {
        let store = InMemoryStore::new();
        let l1 = LaunchId::new("l-1").unwrap();
        let l2 = LaunchId::new("l-2").unwrap();
        store
            .append_event(AuditEvent::LaunchStateChanged { launch_id: l1.clone(), at: Utc::now() })
            .await
            .unwrap();
        store
            .append_event(AuditEvent::LaunchStateChanged { launch_id: l2.clone(), at: Utc::now() })
            .await
            .unwrap();
        let filtered = store.list_events(Some(&l1)).await.unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
