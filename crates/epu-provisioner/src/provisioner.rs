use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use epu_domain::{
    InstanceState, LaunchId, LaunchRecord, LaunchState, NodeId, NodeRecord, ProvisionRequest, Site,
};
use epu_iaas::{DriverRegistry, ObservedIaasState};
use epu_store::StateStore;
use tracing::warn;

use crate::broker::{ContextBrokerClient, IdentityOutcome};
use crate::cluster_doc::ClusterDocument;
use crate::dtrs::DtrsResolver;
use crate::error::ProvisionerError;
use crate::notifier::SubscriberNotifier;

/// The launch/node state machine described in SPEC_FULL.md §4.1. The store
/// plus the driver's own idempotency is the single source of truth: every
/// method here is safe to replay after a crash restart via `recover()`.
pub struct Provisioner {
    store: Arc<dyn StateStore>,
    drivers: Arc<DriverRegistry>,
    broker: Arc<dyn ContextBrokerClient>,
    dtrs: Arc<dyn DtrsResolver>,
    notifier: Arc<dyn SubscriberNotifier>,
    missing_node_window: Duration,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn StateStore>,
        drivers: Arc<DriverRegistry>,
        broker: Arc<dyn ContextBrokerClient>,
        dtrs: Arc<dyn DtrsResolver>,
        notifier: Arc<dyn SubscriberNotifier>,
    ) -> Self {
        Provisioner {
            store,
            drivers,
            broker,
            dtrs,
            notifier,
            missing_node_window: Duration::from_secs(60),
        }
    }

    pub fn with_missing_node_window(mut self, window: Duration) -> Self {
        self.missing_node_window = window;
        self
    }

    // ── prepare_provision ──────────────────────────────────────────────────

    pub async fn prepare_provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<(LaunchRecord, Vec<NodeRecord>), ProvisionerError> {
        let launch_id = request.launch_id.clone().unwrap_or_else(LaunchId::generate);
        let now = Utc::now();

        let dt = match self.dtrs.lookup(&request.deployable_type).await {
            Ok(dt) => dt,
            Err(e) => {
                self.write_failed_launch(&launch_id, &request, now).await?;
                return Err(e);
            }
        };

        let context = match self.broker.create_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.write_failed_launch(&launch_id, &request, now).await?;
                return Err(e);
            }
        };

        let mut node_ids = Vec::new();
        let mut nodes = Vec::new();
        for (ctx_name, group) in &request.nodes {
            for id in &group.ids {
                node_ids.push(id.clone());
                nodes.push(NodeRecord {
                    node_id: id.clone(),
                    launch_id: launch_id.clone(),
                    site: group.site.clone(),
                    allocation: group.allocation.clone(),
                    ctx_name: ctx_name.clone(),
                    state: InstanceState::Requested,
                    state_time: now,
                    iaas_id: None,
                    public_ip: None,
                    private_ip: None,
                    pending_timestamp: None,
                    state_desc: None,
                    revision: 0,
                });
            }
        }

        let launch = LaunchRecord {
            launch_id: launch_id.clone(),
            deployable_type: request.deployable_type.clone(),
            state: LaunchState::Requested,
            document: dt.document,
            context: Some(context),
            node_ids,
            subscribers: request.subscribers.clone(),
            created_at: now,
            vars: request.vars.clone(),
            revision: 0,
        };

        self.store.upsert_launch(launch.clone()).await?;
        for node in &nodes {
            self.store.upsert_node(node.clone()).await?;
        }
        self.notifier.notify_launch(&launch).await;
        for node in &nodes {
            self.notifier.notify_node(node).await;
        }
        Ok((launch, nodes))
    }

    async fn write_failed_launch(
        &self,
        launch_id: &LaunchId,
        request: &ProvisionRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ProvisionerError> {
        let mut node_ids = Vec::new();
        for group in request.nodes.values() {
            node_ids.extend(group.ids.iter().cloned());
        }
        let launch = LaunchRecord {
            launch_id: launch_id.clone(),
            deployable_type: request.deployable_type.clone(),
            state: LaunchState::Failed,
            document: String::new(),
            context: None,
            node_ids,
            subscribers: request.subscribers.clone(),
            created_at: now,
            vars: request.vars.clone(),
            revision: 0,
        };
        self.store.upsert_launch(launch.clone()).await?;
        for (ctx_name, group) in &request.nodes {
            for id in &group.ids {
                let node = NodeRecord {
                    node_id: id.clone(),
                    launch_id: launch_id.clone(),
                    site: group.site.clone(),
                    allocation: group.allocation.clone(),
                    ctx_name: ctx_name.clone(),
                    state: InstanceState::Failed,
                    state_time: now,
                    iaas_id: None,
                    public_ip: None,
                    private_ip: None,
                    pending_timestamp: None,
                    state_desc: Some("prepare_provision failed".into()),
                    revision: 0,
                };
                self.store.upsert_node(node.clone()).await?;
                self.notifier.notify_node(&node).await;
            }
        }
        self.notifier.notify_launch(&launch).await;
        Ok(())
    }

    // ── execute_provision ──────────────────────────────────────────────────

    pub async fn execute_provision(&self, launch_id: &LaunchId) -> Result<(), ProvisionerError> {
        let launch = self
            .store
            .get_launch(launch_id)
            .await?
            .ok_or_else(|| ProvisionerError::LaunchNotFound(launch_id.to_string()))?;
        let nodes = self.store.list_nodes_by_launch(launch_id).await?;
        let doc = ClusterDocument::parse(&launch.document)?;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for n in &nodes {
            *counts.entry(n.ctx_name.as_str()).or_insert(0) += 1;
        }
        doc.validate_request(counts.into_iter())?;

        let mut by_site: HashMap<Site, Vec<NodeRecord>> = HashMap::new();
        for n in nodes.into_iter().filter(|n| n.state.is_pre_iaas()) {
            by_site.entry(n.site.clone()).or_default().push(n);
        }

        let now = Utc::now();
        for (site, group_nodes) in by_site {
            let driver = match self.drivers.for_site(&site) {
                Ok(d) => d,
                Err(e) => {
                    self.fail_nodes(&group_nodes, now).await?;
                    return Err(e.into());
                }
            };

            // One `create_node` call per instance so each gets its own
            // `node_id` in `vars`, on top of the launch-wide vars
            // (`heartbeat_dest` and anything an engine configured).
            for node in &group_nodes {
                let mut vars = launch.vars.clone();
                vars.insert("node_id".into(), node.node_id.to_string());
                let ids = [node.node_id.clone()];

                match driver.create_node(&site, &ids, &node.allocation, &vars).await {
                    Ok(created) => {
                        for iaas_node in created {
                            if let Some(mut stored) = self.store.get_node(&iaas_node.node_id).await? {
                                stored.iaas_id = Some(iaas_node.iaas_id);
                                stored.pending_timestamp = Some(now);
                                stored.advance(InstanceState::Pending, now);
                                self.store.upsert_node(stored.clone()).await?;
                                self.notifier.notify_node(&stored).await;
                            }
                        }
                    }
                    Err(e) => {
                        self.fail_nodes(&[node.clone()], now).await?;
                        return Err(e.into());
                    }
                }
            }
        }

        self.advance_launch_state(launch_id).await?;
        Ok(())
    }

    async fn fail_nodes(&self, nodes: &[NodeRecord], now: DateTime<Utc>) -> Result<(), ProvisionerError> {
        for node in nodes {
            let mut node = node.clone();
            node.advance(InstanceState::Failed, now);
            node.state_desc = Some("create_node failed".into());
            self.store.upsert_node(node.clone()).await?;
            self.notifier.notify_node(&node).await;
        }
        if let Some(first) = nodes.first() {
            self.maybe_fail_launch(&first.launch_id).await?;
        }
        Ok(())
    }

    /// Promote a launch to `Failed` if any of its nodes are `Failed`/`Rejected`
    /// and the launch is not already terminal.
    async fn maybe_fail_launch(&self, launch_id: &LaunchId) -> Result<(), ProvisionerError> {
        let Some(mut launch) = self.store.get_launch(launch_id).await? else { return Ok(()) };
        if matches!(launch.state, LaunchState::Failed | LaunchState::Terminated) {
            return Ok(());
        }
        let nodes = self.store.list_nodes_by_launch(launch_id).await?;
        let any_dead = nodes
            .iter()
            .any(|n| matches!(n.state, InstanceState::Failed | InstanceState::Rejected));
        if any_dead {
            launch.state = LaunchState::Failed;
            self.store.upsert_launch(launch.clone()).await?;
            self.notifier.notify_launch(&launch).await;
        }
        Ok(())
    }

    /// `state` advances to `Pending` once any node is at least `Pending`,
    /// and to `Terminated` once every node is terminal.
    async fn advance_launch_state(&self, launch_id: &LaunchId) -> Result<(), ProvisionerError> {
        let Some(mut launch) = self.store.get_launch(launch_id).await? else { return Ok(()) };
        if matches!(launch.state, LaunchState::Failed | LaunchState::Terminated) {
            return Ok(());
        }
        let nodes = self.store.list_nodes_by_launch(launch_id).await?;
        if nodes.is_empty() {
            return Ok(());
        }
        let changed = if nodes.iter().all(|n| n.state == InstanceState::Terminated) {
            let changed = launch.state != LaunchState::Terminated;
            launch.state = LaunchState::Terminated;
            changed
        } else if nodes.iter().any(|n| n.state >= InstanceState::Pending) && launch.state == LaunchState::Requested {
            launch.state = LaunchState::Pending;
            true
        } else {
            false
        };
        if changed {
            self.store.upsert_launch(launch.clone()).await?;
            self.notifier.notify_launch(&launch).await;
        }
        Ok(())
    }

    // ── query ──────────────────────────────────────────────────────────────

    pub async fn query(&self) -> Result<(), ProvisionerError> {
        self.query_nodes().await?;
        self.query_contexts().await?;
        Ok(())
    }

    async fn query_nodes(&self) -> Result<(), ProvisionerError> {
        let nodes = self.store.list_nodes().await?;
        let now = Utc::now();
        let mut by_site: HashMap<Site, Vec<NodeRecord>> = HashMap::new();
        for n in nodes.into_iter().filter(|n| n.state.is_live()) {
            by_site.entry(n.site.clone()).or_default().push(n);
        }

        for (site, group) in by_site {
            if let Err(e) = self.query_nodes_for_site(&site, group, now).await {
                warn!(site = %site, error = %e, "query_nodes: site pass failed, retrying next tick");
            }
        }
        Ok(())
    }

    async fn query_nodes_for_site(
        &self,
        site: &Site,
        group: Vec<NodeRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), ProvisionerError> {
        let driver = self.drivers.for_site(site)?;
        let iaas_ids: Vec<String> = group.iter().filter_map(|n| n.iaas_id.clone()).collect();
        let observed = driver.list_nodes(site, &iaas_ids).await?;
        let by_iaas_id: HashMap<&str, &epu_iaas::IaasNode> =
            observed.iter().map(|o| (o.iaas_id.as_str(), o)).collect();

        for mut node in group {
            match node.iaas_id.as_deref().and_then(|id| by_iaas_id.get(id)) {
                Some(obs) => {
                    node.update_ips(obs.public_ip.clone(), obs.private_ip.clone());
                    if obs.state == ObservedIaasState::Running && node.state == InstanceState::Pending {
                        node.advance(InstanceState::Started, now);
                    }
                    self.store.upsert_node(node.clone()).await?;
                    self.notifier.notify_node(&node).await;
                }
                None => {
                    let pending_since = node.pending_timestamp.unwrap_or(node.state_time);
                    let age = (now - pending_since).to_std().unwrap_or_default();
                    if age > self.missing_node_window {
                        node.advance(InstanceState::Failed, now);
                        node.state_desc = Some("missing from IaaS list past missing-node window".into());
                        self.store.upsert_node(node.clone()).await?;
                        self.notifier.notify_node(&node).await;
                        self.maybe_fail_launch(&node.launch_id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn query_contexts(&self) -> Result<(), ProvisionerError> {
        let launches = self.store.list_launches().await?;
        for launch in launches {
            if !matches!(launch.state, LaunchState::Requested | LaunchState::Pending) {
                continue;
            }
            if let Err(e) = self.query_context_for_launch(launch).await {
                warn!(error = %e, "query_contexts: launch pass failed, retrying next tick");
            }
        }
        Ok(())
    }

    async fn query_context_for_launch(&self, launch: LaunchRecord) -> Result<(), ProvisionerError> {
        let now = Utc::now();
        let nodes = self.store.list_nodes_by_launch(&launch.launch_id).await?;
        if nodes.is_empty() {
            return Ok(());
        }
        let all_started_or_later = nodes.iter().all(|n| n.state >= InstanceState::Started);
        let any_terminating = nodes.iter().any(|n| n.state == InstanceState::Terminating);
        if !all_started_or_later || any_terminating {
            return Ok(());
        }
        let Some(context) = &launch.context else { return Ok(()) };

        let result = match self.broker.query_context(&context.context_id).await {
            Ok(r) => r,
            Err(ProvisionerError::ContextNotFoundError { context_id }) => {
                warn!(launch_id = %launch.launch_id, %context_id, "context permanently not found, failing launch");
                self.fail_nodes(&nodes, now).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for mut node in nodes {
            if let Some(outcome) = result.identities.get(node.node_id.as_str()) {
                match outcome {
                    IdentityOutcome::Ok => node.advance(InstanceState::Running, now),
                    IdentityOutcome::Error => node.advance(InstanceState::RunningFailed, now),
                }
                self.store.upsert_node(node.clone()).await?;
                self.notifier.notify_node(&node).await;
            }
        }

        if result.complete {
            let refreshed = self.store.list_nodes_by_launch(&launch.launch_id).await?;
            let any_failed = refreshed.iter().any(|n| n.state == InstanceState::RunningFailed);
            let mut launch = launch;
            launch.state = if any_failed { LaunchState::Failed } else { LaunchState::Running };
            self.store.upsert_launch(launch.clone()).await?;
            self.notifier.notify_launch(&launch).await;
        }
        Ok(())
    }

    // ── termination ────────────────────────────────────────────────────────

    /// Mark-then-kill. Transitioning to `Terminating` and destroying are
    /// idempotent: nodes already `Terminating` or `Terminated` are accepted
    /// silently.
    pub async fn terminate_nodes(&self, ids: &[NodeId]) -> Result<(), ProvisionerError> {
        for id in ids {
            let Some(mut node) = self.store.get_node(id).await? else {
                return Err(ProvisionerError::NodeNotFound(id.to_string()));
            };
            if node.state.is_terminal() || node.state == InstanceState::Terminating {
                continue;
            }
            let now = Utc::now();
            node.advance(InstanceState::Terminating, now);
            self.store.upsert_node(node.clone()).await?;
            self.notifier.notify_node(&node).await;
            self.destroy_one(&mut node).await?;
        }
        Ok(())
    }

    pub async fn terminate_launches(&self, ids: &[LaunchId]) -> Result<(), ProvisionerError> {
        for launch_id in ids {
            let nodes = self.store.list_nodes_by_launch(launch_id).await?;
            let ids: Vec<NodeId> = nodes.into_iter().map(|n| n.node_id).collect();
            self.terminate_nodes(&ids).await?;
        }
        Ok(())
    }

    /// Blocks (at the admin RPC boundary) until every live node has been
    /// either destroyed or has failed its destroy call.
    pub async fn terminate_all(&self) -> Result<(), ProvisionerError> {
        let nodes = self.store.list_nodes().await?;
        let ids: Vec<NodeId> = nodes
            .into_iter()
            .filter(|n| !n.state.is_terminal())
            .map(|n| n.node_id)
            .collect();
        self.terminate_nodes(&ids).await
    }

    /// Polling counterpart to `terminate_all`: true once no node remains
    /// non-terminal.
    pub async fn check_terminate_all(&self) -> Result<bool, ProvisionerError> {
        let nodes = self.store.list_nodes().await?;
        Ok(nodes.iter().all(|n| n.state.is_terminal()))
    }

    async fn destroy_one(&self, node: &mut NodeRecord) -> Result<(), ProvisionerError> {
        let now = Utc::now();
        if let Some(iaas_id) = node.iaas_id.clone() {
            let driver = self.drivers.for_site(&node.site)?;
            driver.destroy_node(&node.site, &iaas_id).await?;
        }
        node.advance(InstanceState::Terminated, now);
        self.store.upsert_node(node.clone()).await?;
        self.notifier.notify_node(node).await;
        self.advance_launch_state(&node.launch_id).await?;
        Ok(())
    }

    /// Best-effort diagnostic probe: the Health Monitor calls this after a
    /// node has been `OutOfContact` for a while, before escalating to
    /// `Missing`. Here it simply re-verifies the node against the IaaS
    /// layer on the next `query` tick; failures are logged, not fatal.
    pub async fn dump_state(&self, node_ids: &[NodeId]) -> Result<(), ProvisionerError> {
        for id in node_ids {
            match self.store.get_node(id).await? {
                Some(node) => tracing::info!(node_id = %id, state = %node.state, "dump_state probe"),
                None => warn!(node_id = %id, "dump_state probe: node not found"),
            }
        }
        Ok(())
    }

    /// Process-restart recovery: the store plus idempotent IaaS is the
    /// single source of truth. Replays `execute_provision` for every launch
    /// still `Requested`, re-issues `destroy_node` for every node still
    /// `Terminating`, and promotes fully-terminated launches.
    pub async fn recover(&self) -> Result<(), ProvisionerError> {
        let launches = self.store.list_launches().await?;
        for launch in &launches {
            if launch.state == LaunchState::Requested {
                if let Err(e) = self.execute_provision(&launch.launch_id).await {
                    warn!(launch_id = %launch.launch_id, error = %e, "recover: execute_provision failed");
                }
            }
        }

        let nodes = self.store.list_nodes().await?;
        for node in nodes.into_iter().filter(|n| n.state == InstanceState::Terminating) {
            let mut node = node;
            if let Err(e) = self.destroy_one(&mut node).await {
                warn!(node_id = %node.node_id, error = %e, "recover: destroy_node failed");
            }
        }

        for launch in &launches {
            self.advance_launch_state(&launch.launch_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{ContextQueryResult, MockBroker};
    use crate::dtrs::{DeployableType, StaticDtrs};
    use epu_domain::{NodeGroupRequest, Site};
    use epu_iaas::MockDriver;
    use epu_store::InMemoryStore;
    use std::collections::HashMap as Map;

    const DOC: &str = r#"<cluster><workspace><name>worker</name><image>i</image><quantity>1</quantity><ctx>c</ctx></workspace></cluster>"#;

    async fn test_provisioner() -> (Provisioner, Arc<InMemoryStore>, Arc<MockDriver>, Arc<MockBroker>, Arc<StaticDtrs>) {
        let store = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let mut registry = DriverRegistry::new();
        registry.register(Site("local".into()), driver.clone());
        let broker = Arc::new(MockBroker::new());
        let dtrs = Arc::new(StaticDtrs::new());
        dtrs.register("worker-dt", DeployableType { document: DOC.into(), vars: Map::new() }).await;

        let provisioner = Provisioner::new(
            store.clone(),
            Arc::new(registry),
            broker.clone(),
            dtrs.clone(),
            Arc::new(crate::notifier::NoopNotifier),
        );
        (provisioner, store, driver, broker, dtrs)
    }

    fn single_node_request(launch_id: &str, node_id: &str) -> ProvisionRequest {
        let mut nodes = Map::new();
        nodes.insert(
            "worker".to_string(),
            NodeGroupRequest {
                ids: vec![NodeId::new(node_id).unwrap()],
                site: Site("local".into()),
                allocation: "small".into(),
            },
        );
        ProvisionRequest {
            launch_id: Some(LaunchId::new(launch_id).unwrap()),
            deployable_type: "worker-dt".into(),
            subscribers: vec![],
            nodes,
            vars: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn prepare_then_execute_advances_nodes_to_pending() {
        let (p, store, _driver, _broker, _dtrs) = test_provisioner().await;
        let (launch, _nodes) = p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();

        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Pending);
        assert!(node.iaas_id.is_some());

        let launch = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(launch.state, LaunchState::Pending);
    }

    #[tokio::test]
    async fn execute_provision_passes_launch_vars_and_node_id_to_driver() {
        let (p, _store, driver, _broker, _dtrs) = test_provisioner().await;
        let mut request = single_node_request("l-vars", "n-vars");
        request.vars.insert("heartbeat_dest".into(), "controller-1".into());

        let (launch, _nodes) = p.prepare_provision(request).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();

        let sent = driver.last_vars().await;
        assert_eq!(sent.get("heartbeat_dest").map(String::as_str), Some("controller-1"));
        assert_eq!(sent.get("node_id").map(String::as_str), Some("n-vars"));
    }

    #[tokio::test]
    async fn query_nodes_promotes_pending_to_started() {
        let (p, store, _driver, _broker, _dtrs) = test_provisioner().await;
        let (launch, _) = p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();

        p.query().await.unwrap(); // first list_nodes observation: still pending
        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Pending);

        p.query().await.unwrap(); // second observation: promoted
        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Started);
    }

    #[tokio::test]
    async fn query_contexts_advances_to_running_on_ok_identity() {
        let (p, store, _driver, broker, _dtrs) = test_provisioner().await;
        let (launch, _) = p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();
        p.query().await.unwrap();
        p.query().await.unwrap(); // node now Started

        let context_id = store.get_launch(&launch.launch_id).await.unwrap().unwrap().context.unwrap().context_id;
        let mut identities = Map::new();
        identities.insert("n-1".to_string(), crate::broker::IdentityOutcome::Ok);
        broker.set_result(&context_id, ContextQueryResult { complete: true, identities }).await;

        p.query().await.unwrap();

        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Running);
        let launch = store.get_launch(&launch.launch_id).await.unwrap().unwrap();
        assert_eq!(launch.state, LaunchState::Running);
    }

    #[tokio::test]
    async fn terminate_nodes_is_idempotent() {
        let (p, store, _driver, _broker, _dtrs) = test_provisioner().await;
        let (launch, _) = p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();

        let id = NodeId::new("n-1").unwrap();
        p.terminate_nodes(&[id.clone()]).await.unwrap();
        p.terminate_nodes(&[id.clone()]).await.unwrap();

        let node = store.get_node(&id).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Terminated);
    }

    #[tokio::test]
    async fn recover_drives_requested_launch_to_pending_without_duplicate_create() {
        let (p, store, driver, _broker, _dtrs) = test_provisioner().await;
        // Simulate a crash right after prepare_provision: launch/nodes are
        // written but execute_provision never ran.
        p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();

        p.recover().await.unwrap();
        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Pending);

        // A second recover pass must not create a second IaaS instance.
        let launch = store.get_launch(&LaunchId::new("l-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(launch.state, LaunchState::Pending);
        p.recover().await.unwrap();
        let created = driver
            .create_node(&Site("local".into()), &[NodeId::new("n-1").unwrap()], "small", &Map::new())
            .await
            .unwrap();
        assert_eq!(created.len(), 1); // idempotent: same iaas_id either way
    }

    #[tokio::test]
    async fn missing_node_within_window_is_left_alone() {
        let (p, store, _driver, _broker, _dtrs) = test_provisioner().await;
        let (launch, _) = p.prepare_provision(single_node_request("l-1", "n-1")).await.unwrap();
        p.execute_provision(&launch.launch_id).await.unwrap();

        // Simulate the node vanishing from the driver's view by overwriting
        // its iaas_id so list_nodes never matches it, with a recent
        // pending_timestamp.
        let mut node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        node.iaas_id = Some("ghost-id".into());
        node.pending_timestamp = Some(Utc::now());
        store.upsert_node(node).await.unwrap();

        p.query().await.unwrap();
        let node = store.get_node(&NodeId::new("n-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.state, InstanceState::Pending);
    }
}
