use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use epu_domain::{LaunchId, NodeGroupRequest, NodeId, ProvisionRequest, Site};
use epu_provisioner::Provisioner;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::ControllerError;
use crate::state::ControllerState;

/// One `ctx_name` group's launch shape, the Rust equivalent of the original
/// system's `LaunchItem` (`num_instances`, `allocation_id`, `site`).
#[derive(Debug, Clone)]
pub struct LaunchGroupSpec {
    pub num_instances: u32,
    pub allocation: String,
    pub site: Site,
}

/// What an engine passes to `Control::configure`.
#[derive(Debug, Clone, Default)]
pub struct ControlParameters {
    pub timed_pulse_irregular_ms: Option<u64>,
    pub provisioner_vars: Option<HashMap<String, String>>,
}

/// The facade a decision engine acts through: launch, destroy, and tune its
/// own pulse interval. Everything here is a thin, logged wrapper over the
/// Provisioner plus the Controller's own sensor history.
pub struct ControllerCoreControl {
    provisioner: Arc<Provisioner>,
    state: ControllerState,
    controller_name: String,
    prov_vars: RwLock<HashMap<String, String>>,
    sleep_seconds: RwLock<f64>,
}

impl ControllerCoreControl {
    pub fn new(provisioner: Arc<Provisioner>, state: ControllerState, controller_name: impl Into<String>) -> Self {
        ControllerCoreControl {
            provisioner,
            state,
            controller_name: controller_name.into(),
            prov_vars: RwLock::new(HashMap::new()),
            sleep_seconds: RwLock::new(5.0),
        }
    }

    pub async fn sleep_seconds(&self) -> f64 {
        *self.sleep_seconds.read().await
    }

    /// Choose a fresh `launch_id` and, for every requested instance in every
    /// group, a fresh `node_id`; attach `heartbeat_dest` and any configured
    /// provisioner vars to the request as launch-wide vars. The Provisioner
    /// merges in a per-instance `node_id` when it actually creates each node.
    /// Multi-instance groups are supported: every instance gets its own id,
    /// unlike the distilled system's single-instance restriction.
    pub async fn launch(
        &self,
        deployable_type: &str,
        groups: HashMap<String, LaunchGroupSpec>,
        extravars: Option<HashMap<String, String>>,
    ) -> Result<(LaunchId, HashMap<String, Vec<NodeId>>), ControllerError> {
        let launch_id = LaunchId::generate();
        let now = Utc::now();

        let mut nodes = HashMap::with_capacity(groups.len());
        let mut group_ids = HashMap::with_capacity(groups.len());
        for (ctx_name, spec) in &groups {
            let mut ids = Vec::with_capacity(spec.num_instances as usize);
            for _ in 0..spec.num_instances {
                let id = NodeId::generate();
                self.state.new_launch(&id, now).await;
                ids.push(id);
            }
            nodes.insert(
                ctx_name.clone(),
                NodeGroupRequest { ids: ids.clone(), site: spec.site.clone(), allocation: spec.allocation.clone() },
            );
            group_ids.insert(ctx_name.clone(), ids);
        }

        let mut vars = self.prov_vars.read().await.clone();
        if let Some(extra) = extravars {
            vars.extend(extra);
        }
        vars.insert("heartbeat_dest".into(), self.controller_name.clone());

        let request = ProvisionRequest {
            launch_id: Some(launch_id.clone()),
            deployable_type: deployable_type.to_string(),
            subscribers: vec![self.controller_name.clone()],
            nodes,
            vars,
        };

        self.provisioner.prepare_provision(request).await?;
        self.provisioner.execute_provision(&launch_id).await?;

        info!(launch_id = %launch_id, deployable_type, instance_count = group_ids.values().map(Vec::len).sum::<usize>(), "new launch");
        Ok((launch_id, group_ids))
    }

    pub async fn destroy_instances(&self, ids: &[NodeId]) -> Result<(), ControllerError> {
        self.provisioner.terminate_nodes(ids).await?;
        Ok(())
    }

    pub async fn destroy_launch(&self, launch_id: &LaunchId) -> Result<(), ControllerError> {
        self.provisioner.terminate_launches(&[launch_id.clone()]).await?;
        Ok(())
    }

    pub async fn configure(&self, params: ControlParameters) {
        if let Some(ms) = params.timed_pulse_irregular_ms {
            *self.sleep_seconds.write().await = ms as f64 / 1000.0;
            info!(sleep_seconds = ms as f64 / 1000.0, "engine configured pulse interval");
        }
        if let Some(vars) = params.provisioner_vars {
            *self.prov_vars.write().await = vars;
        }
    }
}
