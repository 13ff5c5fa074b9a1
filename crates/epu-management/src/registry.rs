use std::collections::HashMap;
use std::sync::Arc;

use epu_controller::{ControllerCore, ControllerCoreControl, ControllerState, EngineRegistry, HealthMonitor};
use epu_domain::{Domain, DomainDefinition, DomainId, Heartbeat, DefinitionId};
use epu_provisioner::Provisioner;
use epu_store::StateStore;
use tokio::sync::RwLock;

use crate::error::ManagementError;
use crate::messages::{InstanceInfoMessage, SensorInfoMessage};
use crate::router::MessageRouter;

/// Top-level registry tying domain definitions and live domains to their
/// running Controllers, and authorizing every caller-facing operation
/// against a domain's `owner`.
pub struct EpuManagement {
    store: Arc<dyn StateStore>,
    provisioner: Arc<Provisioner>,
    engines: Arc<EngineRegistry>,
    controllers: RwLock<HashMap<DomainId, Arc<ControllerCore>>>,
    router: MessageRouter,
    default_user: Option<String>,
}

/// Shallow top-level merge of two JSON objects: keys in `override_` win over
/// keys in `base`. A non-object `override_` replaces `base` outright.
fn merge_json(base: serde_json::Value, override_: serde_json::Value) -> serde_json::Value {
    match (base, override_) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (k, v) in override_map {
                base_map.insert(k, v);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_) => override_,
    }
}

impl EpuManagement {
    pub fn new(
        store: Arc<dyn StateStore>,
        provisioner: Arc<Provisioner>,
        engines: Arc<EngineRegistry>,
        default_user: Option<String>,
    ) -> Self {
        EpuManagement {
            router: MessageRouter::new(store.clone()),
            store,
            provisioner,
            engines,
            controllers: RwLock::new(HashMap::new()),
            default_user,
        }
    }

    /// A caller may act on a domain it owns. An unowned domain (empty
    /// `owner`) may only be acted on by the configured default user, never
    /// by an arbitrary caller.
    fn authorize(&self, caller: &str, owner: &str) -> Result<(), ManagementError> {
        if caller == owner {
            return Ok(());
        }
        if owner.is_empty() {
            if let Some(default_user) = &self.default_user {
                if caller == default_user {
                    return Ok(());
                }
            }
        }
        Err(ManagementError::NotPermitted { caller: caller.to_string(), domain_owner: owner.to_string() })
    }

    pub async fn add_domain_definition(&self, definition: DomainDefinition) -> Result<(), ManagementError> {
        self.store.upsert_domain_definition(definition).await?;
        Ok(())
    }

    pub async fn remove_domain_definition(&self, definition_id: &DefinitionId) -> Result<(), ManagementError> {
        self.store.delete_domain_definition(definition_id).await?;
        Ok(())
    }

    pub async fn list_domain_definitions(&self) -> Result<Vec<DomainDefinition>, ManagementError> {
        Ok(self.store.list_domain_definitions().await?)
    }

    pub async fn describe_domain_definition(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<DomainDefinition, ManagementError> {
        self.store
            .get_domain_definition(definition_id)
            .await?
            .ok_or_else(|| ManagementError::DefinitionNotFound(definition_id.as_str().to_string()))
    }

    /// Definitions are a template only: editing one never retroactively
    /// reconfigures domains already instantiated from it.
    pub async fn update_domain_definition(&self, definition: DomainDefinition) -> Result<(), ManagementError> {
        if self.store.get_domain_definition(&definition.definition_id).await?.is_none() {
            return Err(ManagementError::DefinitionNotFound(definition.definition_id.as_str().to_string()));
        }
        self.store.upsert_domain_definition(definition).await?;
        Ok(())
    }

    /// Instantiate a definition into a live domain: build its engine, its
    /// health monitor (if the definition opts in), its Controller, and
    /// register the Controller so routed messages reach it.
    pub async fn add_domain(
        &self,
        caller: &str,
        domain_id: DomainId,
        definition_id: DefinitionId,
        config: serde_json::Value,
        subscribers: Vec<String>,
    ) -> Result<(), ManagementError> {
        if self.store.get_domain(&domain_id).await?.is_some() {
            return Err(ManagementError::DomainAlreadyExists { domain_id: domain_id.as_str().to_string() });
        }
        let definition = self
            .store
            .get_domain_definition(&definition_id)
            .await?
            .ok_or_else(|| ManagementError::DefinitionNotFound(definition_id.as_str().to_string()))?;

        let health = if definition.monitor_health {
            Some(Arc::new(HealthMonitor::new(definition.health, Some(self.provisioner.clone()))))
        } else {
            None
        };
        let state = ControllerState::new(health);
        let control = Arc::new(ControllerCoreControl::new(self.provisioner.clone(), state.clone(), domain_id.as_str()));
        let engine = self.engines.create(&definition.engine_class)?;
        let core = Arc::new(ControllerCore::new(control, state, engine));
        let merged_config = merge_json(definition.engine_conf.clone(), config);
        core.initialize(merged_config.clone()).await?;

        let domain = Domain {
            domain_id: domain_id.clone(),
            owner: caller.to_string(),
            definition_id,
            config: merged_config,
            subscribers,
            revision: 0,
        };
        self.store.upsert_domain(domain).await?;
        self.controllers.write().await.insert(domain_id, core);
        Ok(())
    }

    pub async fn remove_domain(&self, caller: &str, domain_id: &DomainId) -> Result<(), ManagementError> {
        let domain = self.domain_or_not_found(domain_id).await?;
        self.authorize(caller, &domain.owner)?;
        self.controllers.write().await.remove(domain_id);
        self.store.delete_domain(domain_id).await?;
        Ok(())
    }

    pub async fn reconfigure_domain(
        &self,
        caller: &str,
        domain_id: &DomainId,
        config: serde_json::Value,
    ) -> Result<(), ManagementError> {
        let mut domain = self.domain_or_not_found(domain_id).await?;
        self.authorize(caller, &domain.owner)?;
        let controllers = self.controllers.read().await;
        let core = controllers
            .get(domain_id)
            .ok_or_else(|| ManagementError::DomainNotFound(domain_id.as_str().to_string()))?;
        core.run_reconfigure(config.clone()).await?;
        domain.config = config;
        self.store.upsert_domain(domain).await?;
        Ok(())
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>, ManagementError> {
        Ok(self.store.list_domains().await?)
    }

    pub async fn describe_domain(&self, domain_id: &DomainId) -> Result<Domain, ManagementError> {
        self.domain_or_not_found(domain_id).await
    }

    pub async fn subscribe_domain(
        &self,
        caller: &str,
        domain_id: &DomainId,
        subscriber: String,
    ) -> Result<(), ManagementError> {
        let mut domain = self.domain_or_not_found(domain_id).await?;
        self.authorize(caller, &domain.owner)?;
        if !domain.subscribers.contains(&subscriber) {
            domain.subscribers.push(subscriber);
        }
        self.store.upsert_domain(domain).await?;
        Ok(())
    }

    pub async fn unsubscribe_domain(
        &self,
        caller: &str,
        domain_id: &DomainId,
        subscriber: &str,
    ) -> Result<(), ManagementError> {
        let mut domain = self.domain_or_not_found(domain_id).await?;
        self.authorize(caller, &domain.owner)?;
        domain.subscribers.retain(|s| s != subscriber);
        self.store.upsert_domain(domain).await?;
        Ok(())
    }

    async fn domain_or_not_found(&self, domain_id: &DomainId) -> Result<Domain, ManagementError> {
        self.store
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| ManagementError::DomainNotFound(domain_id.as_str().to_string()))
    }

    /// Drive one `decide` tick for every live domain's Controller. The
    /// server binary calls this on its own timer; each Controller's
    /// single-permit gate (see `ControllerCore::run_decide`) absorbs a tick
    /// that overlaps a still-running reconfigure.
    pub async fn tick_all(&self) {
        let controllers: Vec<_> = self.controllers.read().await.values().cloned().collect();
        for core in controllers {
            if let Err(e) = core.run_decide().await {
                tracing::warn!(error = %e, "decide tick failed");
            }
        }
    }

    /// Infrastructure-origin messages: trusted transport, no caller identity
    /// to authorize against.
    pub async fn ou_heartbeat(&self, heartbeat: Heartbeat) -> Result<(), ManagementError> {
        self.router.route_heartbeat(&self.controllers, heartbeat).await
    }

    pub async fn instance_info(&self, msg: InstanceInfoMessage) -> Result<(), ManagementError> {
        self.router.route_instance_info(&self.controllers, msg).await
    }

    pub async fn sensor_info(&self, msg: SensorInfoMessage) -> Result<(), ManagementError> {
        self.router.route_sensor_info(&self.controllers, msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epu_controller::{DecisionEngine, FixedSizeEngine};
    use epu_domain::HealthTimeouts;
    use epu_iaas::{DriverRegistry, MockDriver};
    use epu_provisioner::{DeployableType, MockBroker, NoopNotifier, StaticDtrs};
    use epu_store::InMemoryStore;

    async fn test_management(default_user: Option<String>) -> EpuManagement {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let mut registry = DriverRegistry::new();
        registry.register(epu_domain::Site("local".into()), driver);
        let dtrs = Arc::new(StaticDtrs::new());
        dtrs.register(
            "worker-dt",
            DeployableType {
                document: r#"<cluster><workspace><name>worker</name><image>i</image><quantity>1</quantity><ctx>c</ctx></workspace></cluster>"#.into(),
                vars: HashMap::new(),
            },
        )
        .await;
        let provisioner = Arc::new(Provisioner::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(MockBroker::new()),
            dtrs,
            Arc::new(NoopNotifier),
        ));
        let mut engines = EngineRegistry::new();
        engines.register("fixed-size", Arc::new(|| Box::new(FixedSizeEngine::new()) as Box<dyn DecisionEngine>));
        EpuManagement::new(store, provisioner, Arc::new(engines), default_user)
    }

    fn definition() -> DomainDefinition {
        DomainDefinition {
            definition_id: DefinitionId::new("def-1").unwrap(),
            engine_class: "fixed-size".into(),
            engine_conf: serde_json::json!({}),
            health: HealthTimeouts::default(),
            monitor_health: false,
            revision: 0,
        }
    }

    fn engine_config() -> serde_json::Value {
        serde_json::json!({ "allocation": "small", "site": "local", "deployable_type": "worker-dt", "desired_instances": 0 })
    }

    #[tokio::test]
    async fn owner_can_reconfigure_own_domain() {
        let mgmt = test_management(None).await;
        mgmt.add_domain_definition(definition()).await.unwrap();
        let domain_id = DomainId::new("d-1").unwrap();
        mgmt.add_domain("alice", domain_id.clone(), definition().definition_id, engine_config(), vec![]).await.unwrap();

        mgmt.reconfigure_domain("alice", &domain_id, engine_config()).await.unwrap();
    }

    #[tokio::test]
    async fn non_owner_is_rejected() {
        let mgmt = test_management(None).await;
        mgmt.add_domain_definition(definition()).await.unwrap();
        let domain_id = DomainId::new("d-1").unwrap();
        mgmt.add_domain("alice", domain_id.clone(), definition().definition_id, engine_config(), vec![]).await.unwrap();

        let err = mgmt.reconfigure_domain("mallory", &domain_id, engine_config()).await.unwrap_err();
        assert!(matches!(err, ManagementError::NotPermitted { .. }));
    }

    #[tokio::test]
    async fn default_user_can_act_only_on_unowned_domain() {
        let mgmt = test_management(Some("admin".into())).await;
        mgmt.add_domain_definition(definition()).await.unwrap();
        let domain_id = DomainId::new("d-1").unwrap();
        mgmt.add_domain("", domain_id.clone(), definition().definition_id, engine_config(), vec![]).await.unwrap();

        mgmt.reconfigure_domain("admin", &domain_id, engine_config()).await.unwrap();

        let owned_id = DomainId::new("d-2").unwrap();
        mgmt.add_domain("alice", owned_id.clone(), definition().definition_id, engine_config(), vec![]).await.unwrap();
        let err = mgmt.reconfigure_domain("admin", &owned_id, engine_config()).await.unwrap_err();
        assert!(matches!(err, ManagementError::NotPermitted { .. }));
    }

    #[tokio::test]
    async fn engine_conf_is_merged_into_domain_config_at_add_time() {
        let mgmt = test_management(None).await;
        let mut def = definition();
        def.engine_conf = serde_json::json!({ "site": "local", "allocation": "small" });
        mgmt.add_domain_definition(def.clone()).await.unwrap();

        let domain_id = DomainId::new("d-1").unwrap();
        let caller_config =
            serde_json::json!({ "deployable_type": "worker-dt", "desired_instances": 0, "allocation": "large" });
        mgmt.add_domain("alice", domain_id.clone(), def.definition_id, caller_config, vec![]).await.unwrap();

        let domain = mgmt.describe_domain(&domain_id).await.unwrap();
        assert_eq!(domain.config["site"], "local");
        assert_eq!(domain.config["allocation"], "large");
        assert_eq!(domain.config["deployable_type"], "worker-dt");
    }

    #[tokio::test]
    async fn adding_duplicate_domain_id_fails() {
        let mgmt = test_management(None).await;
        mgmt.add_domain_definition(definition()).await.unwrap();
        let domain_id = DomainId::new("d-1").unwrap();
        mgmt.add_domain("alice", domain_id.clone(), definition().definition_id, engine_config(), vec![]).await.unwrap();

        let err = mgmt.add_domain("alice", domain_id, definition().definition_id, engine_config(), vec![]).await.unwrap_err();
        assert!(matches!(err, ManagementError::DomainAlreadyExists { .. }));
    }
}
