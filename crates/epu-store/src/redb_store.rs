use std::path::Path;

use async_trait::async_trait;
use epu_domain::{
    DefinitionId, Domain, DomainDefinition, DomainId, HealthRecord, LaunchId, LaunchRecord, NodeId,
    NodeRecord,
};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::events::AuditEvent;
use crate::store::StateStore;

const LAUNCHES: TableDefinition<&str, &[u8]> = TableDefinition::new("launches");
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
const HEALTH: TableDefinition<&str, &[u8]> = TableDefinition::new("health");
const DOMAINS: TableDefinition<&str, &[u8]> = TableDefinition::new("domains");
const DEFINITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("definitions");
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const EVENT_SEQ_KEY: &str = "event_seq";

/// Implemented by every record type the optimistic-concurrency path in
/// `put_json_cas` needs to read and stamp a revision on.
trait Versioned {
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);
}

macro_rules! impl_versioned {
    ($ty:ty) => {
        impl Versioned for $ty {
            fn revision(&self) -> u64 {
                self.revision
            }
            fn set_revision(&mut self, revision: u64) {
                self.revision = revision;
            }
        }
    };
}

impl_versioned!(LaunchRecord);
impl_versioned!(NodeRecord);
impl_versioned!(HealthRecord);
impl_versioned!(Domain);
impl_versioned!(DomainDefinition);

/// Durable store backed by a single `redb` file. Every write commits its
/// own transaction; record bytes are canonical JSON, matching the "values
/// are self-describing dictionaries" layout the spec describes.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Internal(format!("create store dir: {}", e)))?;
        }
        let db = Database::create(path)
            .map_err(|e| StoreError::Internal(format!("open redb database: {}", e)))?;

        let txn = db
            .begin_write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            txn.open_table(LAUNCHES).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(NODES).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(HEALTH).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(DOMAINS).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(DEFINITIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(EVENTS).map_err(|e| StoreError::Internal(e.to_string()))?;
            txn.open_table(META).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(RedbStore { db })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = txn.open_table(table).map_err(|e| StoreError::Internal(e.to_string()))?;
        match t.get(key).map_err(|e| StoreError::Internal(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn list_json<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = txn.open_table(table).map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut out = Vec::new();
        for row in t.iter().map_err(|e| StoreError::Internal(e.to_string()))? {
            let (_, bytes) = row.map_err(|e| StoreError::Internal(e.to_string()))?;
            out.push(serde_json::from_slice(bytes.value())?);
        }
        Ok(out)
    }

    /// Like a plain insert, but within the same write transaction reads back
    /// whatever is currently at `key`, requires `value`'s revision to match
    /// it (a fresh insert accepts any revision), and stamps the advanced
    /// revision onto `value` before writing.
    fn put_json_cas<T>(&self, table: TableDefinition<&str, &[u8]>, key: &str, mut value: T) -> Result<(), StoreError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Versioned,
    {
        let txn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut t = txn.open_table(table).map_err(|e| StoreError::Internal(e.to_string()))?;
            let existing_revision = match t.get(key).map_err(|e| StoreError::Internal(e.to_string()))? {
                Some(bytes) => {
                    let existing: T = serde_json::from_slice(bytes.value())?;
                    Some(existing.revision())
                }
                None => None,
            };
            match existing_revision {
                None => value.set_revision(0),
                Some(current) if current == value.revision() => value.set_revision(current + 1),
                Some(_) => return Err(StoreError::WriteConflict { holder: key.to_string() }),
            }
            let bytes = serde_json::to_vec(&value)?;
            t.insert(key, bytes.as_slice()).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut t = txn.open_table(table).map_err(|e| StoreError::Internal(e.to_string()))?;
            t.remove(key).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    fn next_event_seq(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        let seq = {
            let mut meta = txn.open_table(META).map_err(|e| StoreError::Internal(e.to_string()))?;
            let current = meta
                .get(EVENT_SEQ_KEY)
                .map_err(|e| StoreError::Internal(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current + 1;
            meta.insert(EVENT_SEQ_KEY, next)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            next
        };
        txn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(seq)
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn get_launch(&self, id: &LaunchId) -> Result<Option<LaunchRecord>, StoreError> {
        self.get_json(LAUNCHES, id.as_str())
    }

    async fn list_launches(&self) -> Result<Vec<LaunchRecord>, StoreError> {
        self.list_json(LAUNCHES)
    }

    async fn upsert_launch(&self, launch: LaunchRecord) -> Result<(), StoreError> {
        let key = launch.launch_id.to_string();
        self.put_json_cas(LAUNCHES, &key, launch)
    }

    async fn delete_launch(&self, id: &LaunchId) -> Result<(), StoreError> {
        self.remove(LAUNCHES, id.as_str())
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<NodeRecord>, StoreError> {
        self.get_json(NODES, id.as_str())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        self.list_json(NODES)
    }

    async fn list_nodes_by_launch(&self, launch_id: &LaunchId) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self
            .list_json::<NodeRecord>(NODES)?
            .into_iter()
            .filter(|n| &n.launch_id == launch_id)
            .collect())
    }

    async fn upsert_node(&self, node: NodeRecord) -> Result<(), StoreError> {
        let key = node.node_id.to_string();
        self.put_json_cas(NODES, &key, node)
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), StoreError> {
        self.remove(NODES, id.as_str())
    }

    async fn get_health(&self, id: &NodeId) -> Result<Option<HealthRecord>, StoreError> {
        self.get_json(HEALTH, id.as_str())
    }

    async fn list_health(&self) -> Result<Vec<HealthRecord>, StoreError> {
        self.list_json(HEALTH)
    }

    async fn upsert_health(&self, health: HealthRecord) -> Result<(), StoreError> {
        let key = health.node_id.to_string();
        self.put_json_cas(HEALTH, &key, health)
    }

    async fn delete_health(&self, id: &NodeId) -> Result<(), StoreError> {
        self.remove(HEALTH, id.as_str())
    }

    async fn get_domain(&self, id: &DomainId) -> Result<Option<Domain>, StoreError> {
        self.get_json(DOMAINS, id.as_str())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, StoreError> {
        self.list_json(DOMAINS)
    }

    async fn upsert_domain(&self, domain: Domain) -> Result<(), StoreError> {
        let key = domain.domain_id.to_string();
        self.put_json_cas(DOMAINS, &key, domain)
    }

    async fn delete_domain(&self, id: &DomainId) -> Result<(), StoreError> {
        self.remove(DOMAINS, id.as_str())
    }

    async fn get_domain_definition(&self, id: &DefinitionId) -> Result<Option<DomainDefinition>, StoreError> {
        self.get_json(DEFINITIONS, id.as_str())
    }

    async fn list_domain_definitions(&self) -> Result<Vec<DomainDefinition>, StoreError> {
        self.list_json(DEFINITIONS)
    }

    async fn upsert_domain_definition(&self, def: DomainDefinition) -> Result<(), StoreError> {
        let key = def.definition_id.to_string();
        self.put_json_cas(DEFINITIONS, &key, def)
    }

    async fn delete_domain_definition(&self, id: &DefinitionId) -> Result<(), StoreError> {
        self.remove(DEFINITIONS, id.as_str())
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        let seq = self.next_event_seq()?;
        let bytes = serde_json::to_vec(&event)?;
        let txn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut t = txn.open_table(EVENTS).map_err(|e| StoreError::Internal(e.to_string()))?;
            t.insert(seq, bytes.as_slice()).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn list_events(&self, launch_id: Option<&LaunchId>) -> Result<Vec<AuditEvent>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = txn.open_table(EVENTS).map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut out = Vec::new();
        for row in t.iter().map_err(|e| StoreError::Internal(e.to_string()))? {
            let (_, bytes) = row.map_err(|e| StoreError::Internal(e.to_string()))?;
            let event: AuditEvent = serde_json::from_slice(bytes.value())?;
            match launch_id {
                Some(id) if event.launch_id() != Some(id) => continue,
                _ => out.push(event),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use epu_domain::LaunchState;
    use std::collections::HashMap;

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
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.upsert_launch(sample_launch("l-1")).await.unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let got = store
            .get_launch(&LaunchId::new("l-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.deployable_type, "dt");
    }

    #[tokio::test]
    async fn upsert_launch_rejects_stale_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("state.redb")).unwrap();
        let launch = sample_launch("l-1");
        store.upsert_launch(launch.clone()).await.unwrap();

        let got = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(got.revision, 0);
        store.upsert_launch(got).await.unwrap();

        let err = store.upsert_launch(launch).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn event_sequence_is_monotonic_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("state.redb")).unwrap();
        let launch_id = LaunchId::new("l-1").unwrap();
        for _ in 0..3 {
            store
                .append_event(AuditEvent::LaunchStateChanged { launch_id: launch_id.clone(), at: Utc::now() })
                .await
                .unwrap();
        }
        assert_eq!(store.list_events(None).await.unwrap().len(), 3);
    }
}
