use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use epu_domain::{Heartbeat, HealthRecord, HealthTimeouts, HeartbeatState, InstanceHealthState, InstanceState, NodeId};
use epu_provisioner::Provisioner;
use tokio::sync::RwLock;

/// Classifies each node's health axis independent of `InstanceState`,
/// driven by node-state events from the Provisioner's subscription and
/// heartbeats from OU Agents.
pub struct HealthMonitor {
    timeouts: HealthTimeouts,
    nodes: RwLock<HashMap<NodeId, HealthRecord>>,
    /// Used to fire a best-effort `dump_state` probe the first time a node
    /// goes `OUT_OF_CONTACT`, per spec §4.2. Optional so tests can exercise
    /// pure classification without a provisioner wired up.
    provisioner: Option<Arc<Provisioner>>,
}

impl HealthMonitor {
    pub fn new(timeouts: HealthTimeouts, provisioner: Option<Arc<Provisioner>>) -> Self {
        HealthMonitor {
            timeouts,
            nodes: RwLock::new(HashMap::new()),
            provisioner,
        }
    }

    /// Ingest an instance-state sample. `instance_state`/`instance_state_time`
    /// track the most advanced observed state; out-of-order replays (e.g.
    /// during `recover()`) are no-ops.
    pub async fn node_state(&self, node_id: &NodeId, state: InstanceState, at: DateTime<Utc>) {
        let mut nodes = self.nodes.write().await;
        let record = nodes
            .entry(node_id.clone())
            .or_insert_with(|| HealthRecord::new(node_id.clone(), state, at));
        if state >= record.instance_state {
            record.instance_state = state;
            record.instance_state_time = at;
        }
    }

    /// `OK` clears any remembered failures; an error heartbeat classifies
    /// as `PROCESS_ERROR` when it names failed processes, `MONITOR_ERROR`
    /// otherwise, and remembers each failure's detail only on first
    /// occurrence of its `(name, state, exitcode, stop_timestamp)` key.
    pub async fn new_heartbeat(&self, hb: &Heartbeat, now: DateTime<Utc>) {
        let mut nodes = self.nodes.write().await;
        let record = nodes
            .entry(hb.node_id.clone())
            .or_insert_with(|| HealthRecord::new(hb.node_id.clone(), InstanceState::Requesting, now));
        record.last_heartbeat = Some(now);
        record.missing_timeout_start = None;

        match hb.state {
            HeartbeatState::Ok => {
                record.health = InstanceHealthState::Ok;
                record.errors.clear();
                record.error_time = None;
            }
            HeartbeatState::Error => {
                record.health = if hb.failed_processes.is_empty() {
                    InstanceHealthState::MonitorError
                } else {
                    InstanceHealthState::ProcessError
                };
                record.error_time.get_or_insert(now);
                for failed in &hb.failed_processes {
                    let known = record.errors.iter().any(|e| e.cache_key() == failed.cache_key());
                    if !known {
                        record.errors.push(failed.clone());
                    }
                }
            }
        }
    }

    /// Reclassify every monitored node against wall time `now`: boot grace,
    /// out-of-contact/missing escalation, zombie detection on terminated
    /// nodes that are still heartbeating.
    pub async fn update(&self, now: DateTime<Utc>) {
        let mut probes = Vec::new();
        {
            let mut nodes = self.nodes.write().await;
            for record in nodes.values_mut() {
                if record.instance_state == InstanceState::Terminated {
                    if let Some(hb) = record.last_heartbeat {
                        if (now - hb).num_seconds() as u64 <= self.timeouts.zombie_seconds {
                            record.health = InstanceHealthState::Zombie;
                        }
                    }
                    continue;
                }
                if record.instance_state < InstanceState::Started {
                    continue;
                }

                let booting = record.last_heartbeat.is_none()
                    && (now - record.instance_state_time).num_seconds() as u64 < self.timeouts.boot_seconds;
                if booting {
                    continue;
                }

                let stale = record
                    .last_heartbeat
                    .map(|hb| (now - hb).num_seconds() as u64 > self.timeouts.missing_seconds)
                    .unwrap_or(true);
                if !stale {
                    record.missing_timeout_start = None;
                    continue;
                }

                match record.missing_timeout_start {
                    None => {
                        record.missing_timeout_start = Some(now);
                        record.health = InstanceHealthState::OutOfContact;
                        probes.push(record.node_id.clone());
                    }
                    Some(start) => {
                        let elapsed = (now - start).num_seconds() as u64;
                        record.health = if elapsed >= self.timeouts.really_missing_seconds {
                            InstanceHealthState::Missing
                        } else {
                            InstanceHealthState::OutOfContact
                        };
                    }
                }
            }
        }

        if let Some(provisioner) = &self.provisioner {
            if !probes.is_empty() {
                let _ = provisioner.dump_state(&probes).await;
            }
        }
    }

    pub async fn get(&self, node_id: &NodeId) -> Option<HealthRecord> {
        self.nodes.read().await.get(node_id).cloned()
    }

    pub async fn get_all(&self) -> Vec<HealthRecord> {
        self.nodes.read().await.values().cloned().collect()
    }
}

pub fn is_ok(record: &HealthRecord) -> bool {
    matches!(record.health, InstanceHealthState::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use epu_domain::FailedProcess;

    fn timeouts() -> HealthTimeouts {
        HealthTimeouts { boot_seconds: 0, missing_seconds: 60, really_missing_seconds: 120, zombie_seconds: 30 }
    }

    #[tokio::test]
    async fn ok_heartbeat_clears_prior_errors() {
        let monitor = HealthMonitor::new(timeouts(), None);
        let id = NodeId::new("n-1").unwrap();
        let now = Utc::now();
        monitor.node_state(&id, InstanceState::Started, now).await;

        let err_hb = Heartbeat {
            node_id: id.clone(),
            timestamp: 0.0,
            state: HeartbeatState::Error,
            failed_processes: vec![FailedProcess {
                name: "worker".into(), state: "EXITED".into(), statename: "EXITED".into(),
                exitcode: Some(1), stop_timestamp: Some(10), error: None, stderr: Some("boom".into()),
            }],
            supervisor_error: None,
        };
        monitor.new_heartbeat(&err_hb, now).await;
        assert_eq!(monitor.get(&id).await.unwrap().health, InstanceHealthState::ProcessError);

        let ok_hb = Heartbeat { node_id: id.clone(), timestamp: 1.0, state: HeartbeatState::Ok, failed_processes: vec![], supervisor_error: None };
        monitor.new_heartbeat(&ok_hb, now).await;
        let record = monitor.get(&id).await.unwrap();
        assert_eq!(record.health, InstanceHealthState::Ok);
        assert!(record.errors.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_failure_is_not_duplicated() {
        let monitor = HealthMonitor::new(timeouts(), None);
        let id = NodeId::new("n-1").unwrap();
        let now = Utc::now();
        monitor.node_state(&id, InstanceState::Started, now).await;

        let failure = FailedProcess {
            name: "worker".into(), state: "EXITED".into(), statename: "EXITED".into(),
            exitcode: Some(1), stop_timestamp: Some(10), error: None, stderr: Some("boom".into()),
        };
        let hb = Heartbeat { node_id: id.clone(), timestamp: 0.0, state: HeartbeatState::Error, failed_processes: vec![failure.clone()], supervisor_error: None };
        monitor.new_heartbeat(&hb, now).await;
        monitor.new_heartbeat(&hb, now).await;

        assert_eq!(monitor.get(&id).await.unwrap().errors.len(), 1);
    }

    #[tokio::test]
    async fn missing_escalates_to_really_missing_after_window() {
        let monitor = HealthMonitor::new(timeouts(), None);
        let id = NodeId::new("n-1").unwrap();
        let t0 = Utc::now();
        monitor.node_state(&id, InstanceState::Started, t0).await;

        monitor.update(t0 + Duration::seconds(61)).await;
        assert_eq!(monitor.get(&id).await.unwrap().health, InstanceHealthState::OutOfContact);

        monitor.update(t0 + Duration::seconds(61 + 121)).await;
        assert_eq!(monitor.get(&id).await.unwrap().health, InstanceHealthState::Missing);
    }

    #[tokio::test]
    async fn heartbeat_after_terminated_within_window_is_zombie() {
        let monitor = HealthMonitor::new(timeouts(), None);
        let id = NodeId::new("n-1").unwrap();
        let t0 = Utc::now();
        monitor.node_state(&id, InstanceState::Terminated, t0).await;
        let hb = Heartbeat { node_id: id.clone(), timestamp: 0.0, state: HeartbeatState::Ok, failed_processes: vec![], supervisor_error: None };
        monitor.new_heartbeat(&hb, t0).await;

        monitor.update(t0 + Duration::seconds(5)).await;
        assert_eq!(monitor.get(&id).await.unwrap().health, InstanceHealthState::Zombie);
    }
}
