use std::sync::Arc;

use epu_management::EpuManagement;
use epu_provisioner::Provisioner;
use epu_store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub provisioner: Arc<Provisioner>,
    pub management: Arc<EpuManagement>,
    pub auth_token: Arc<String>,
}
