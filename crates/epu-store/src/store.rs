use async_trait::async_trait;
use epu_domain::{Domain, DomainDefinition, DomainId, HealthRecord, LaunchId, LaunchRecord, NodeId, NodeRecord};

use crate::error::StoreError;
use crate::events::AuditEvent;

/// The durable, per-record namespace described in the spec's "Persisted
/// state layout": launches by `launch_id`, nodes by `node_id`, domains by
/// `(owner, domain_id)`, accessed under per-record optimistic semantics —
/// readers may see stale data between writes but never partial records.
///
/// Every record carries a `revision` stamp. `upsert_*` treats a record
/// absent from the store as a fresh insert regardless of the incoming
/// revision; for a record the store already holds, the incoming revision
/// must match the stored one or the call fails with
/// `StoreError::WriteConflict` and the caller must re-read and retry. A
/// caller that always writes back a record it just read (the pattern every
/// call site in this workspace follows) gets this for free.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_launch(&self, id: &LaunchId) -> Result<Option<LaunchRecord>, StoreError>;
    async fn list_launches(&self) -> Result<Vec<LaunchRecord>, StoreError>;
    async fn upsert_launch(&self, launch: LaunchRecord) -> Result<(), StoreError>;
    async fn delete_launch(&self, id: &LaunchId) -> Result<(), StoreError>;

    async fn get_node(&self, id: &NodeId) -> Result<Option<NodeRecord>, StoreError>;
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError>;
    async fn list_nodes_by_launch(&self, launch_id: &LaunchId) -> Result<Vec<NodeRecord>, StoreError>;
    async fn upsert_node(&self, node: NodeRecord) -> Result<(), StoreError>;
    async fn delete_node(&self, id: &NodeId) -> Result<(), StoreError>;

    async fn get_health(&self, id: &NodeId) -> Result<Option<HealthRecord>, StoreError>;
    async fn list_health(&self) -> Result<Vec<HealthRecord>, StoreError>;
    async fn upsert_health(&self, health: HealthRecord) -> Result<(), StoreError>;
    async fn delete_health(&self, id: &NodeId) -> Result<(), StoreError>;

    async fn get_domain(&self, id: &DomainId) -> Result<Option<Domain>, StoreError>;
    async fn list_domains(&self) -> Result<Vec<Domain>, StoreError>;
    async fn upsert_domain(&self, domain: Domain) -> Result<(), StoreError>;
    async fn delete_domain(&self, id: &DomainId) -> Result<(), StoreError>;

    async fn get_domain_definition(
        &self,
        id: &epu_domain::DefinitionId,
    ) -> Result<Option<DomainDefinition>, StoreError>;
    async fn list_domain_definitions(&self) -> Result<Vec<DomainDefinition>, StoreError>;
    async fn upsert_domain_definition(&self, def: DomainDefinition) -> Result<(), StoreError>;
    async fn delete_domain_definition(&self, id: &epu_domain::DefinitionId) -> Result<(), StoreError>;

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError>;
    async fn list_events(&self, launch_id: Option<&LaunchId>) -> Result<Vec<AuditEvent>, StoreError>;
}
