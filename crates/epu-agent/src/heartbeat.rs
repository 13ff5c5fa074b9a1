use chrono::Utc;
use epu_domain::{FailedProcess, Heartbeat, HeartbeatState, NodeId};

use crate::supervisor::{FailureDetector, ProcessSupervisor, SupervisorError};

/// Builds one heartbeat payload for `node_id`. With no supervisor configured
/// the agent always reports `OK`, matching the distilled system's allowance
/// for running without a real supervisord (used in tests and minimal VMs).
pub async fn build_heartbeat(
    node_id: &NodeId,
    detector: &mut FailureDetector,
    supervisor: Option<&dyn ProcessSupervisor>,
) -> Heartbeat {
    let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;

    let Some(supervisor) = supervisor else {
        return Heartbeat { node_id: node_id.clone(), timestamp, state: HeartbeatState::Ok, failed_processes: vec![], supervisor_error: None };
    };

    match detector.check(supervisor).await {
        Ok(failed) if failed.is_empty() => {
            Heartbeat { node_id: node_id.clone(), timestamp, state: HeartbeatState::Ok, failed_processes: vec![], supervisor_error: None }
        }
        Ok(failed) => Heartbeat {
            node_id: node_id.clone(),
            timestamp,
            state: HeartbeatState::Error,
            failed_processes: failed,
            supervisor_error: None,
        },
        Err(SupervisorError::Query(msg)) => Heartbeat {
            node_id: node_id.clone(),
            timestamp,
            state: HeartbeatState::Error,
            failed_processes: Vec::<FailedProcess>::new(),
            supervisor_error: Some(msg),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_supervisor_always_reports_ok() {
        let mut detector = FailureDetector::new();
        let id = NodeId::new("n-1").unwrap();
        let hb = build_heartbeat(&id, &mut detector, None).await;
        assert_eq!(hb.state, HeartbeatState::Ok);
    }
}
