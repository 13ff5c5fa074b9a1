pub mod fixed_size;
pub mod queue_length;

use chrono::{DateTime, Utc};
use epu_domain::{InstanceState, NodeId};

use crate::control::ControllerCoreControl;
use crate::error::ControllerError;
use crate::health::is_ok as health_is_ok;
use crate::state::ControllerState;

pub use fixed_size::FixedSizeEngine;
pub use queue_length::QueueLengthEngine;

/// Nodes not yet terminal/terminating, paired with the time of their latest
/// observed state. Nodes failing their health check are destroyed
/// immediately and excluded from the result, matching the shared
/// "failing health destroys immediately" rule both representative
/// policies follow.
pub(crate) async fn live_nodes(
    control: &ControllerCoreControl,
    state: &ControllerState,
) -> Result<Vec<(NodeId, DateTime<Utc>)>, ControllerError> {
    let histories = state.get_all_instance_states().await;
    let mut live = Vec::new();
    let mut to_kill = Vec::new();

    for history in &histories {
        let Some(latest) = history.last() else { continue };
        let Ok(node_id) = NodeId::new(latest.key.clone()) else { continue };
        if latest.value.is_terminal() || latest.value == InstanceState::Terminating {
            continue;
        }
        match state.get_instance_health(&node_id).await {
            Some(health) if !health_is_ok(&health) && health.health != epu_domain::InstanceHealthState::Unknown => {
                to_kill.push(node_id);
            }
            _ => live.push((node_id, latest.time)),
        }
    }

    if !to_kill.is_empty() {
        control.destroy_instances(&to_kill).await?;
    }
    Ok(live)
}
