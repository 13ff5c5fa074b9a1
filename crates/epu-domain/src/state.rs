use serde::{Deserialize, Serialize};
use std::fmt;

/// Instance lifecycle state. Ordered lexicographically by the numeric code
/// embedded in each variant's wire representation, so a raw string
/// comparison of two persisted records reproduces the same order as
/// `Ord`/`PartialOrd` here. Any observed transition must be non-decreasing
/// except via the explicit dead-end variants, which are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    Requesting,
    Requested,
    ErrorRetrying,
    Pending,
    Started,
    Running,
    RunningFailed,
    Terminating,
    Terminated,
    Failed,
    Rejected,
}

impl InstanceState {
    /// The three-digit-prefixed wire code, matching the original system's
    /// string constants (`"100-REQUESTING"` .. `"950-REJECTED"`).
    pub fn code(self) -> &'static str {
        match self {
            InstanceState::Requesting => "100-REQUESTING",
            InstanceState::Requested => "200-REQUESTED",
            InstanceState::ErrorRetrying => "300-ERROR_RETRYING",
            InstanceState::Pending => "400-PENDING",
            InstanceState::Started => "500-STARTED",
            InstanceState::Running => "600-RUNNING",
            InstanceState::RunningFailed => "650-RUNNING_FAILED",
            InstanceState::Terminating => "700-TERMINATING",
            InstanceState::Terminated => "800-TERMINATED",
            InstanceState::Failed => "900-FAILED",
            InstanceState::Rejected => "950-REJECTED",
        }
    }

    /// A node in this state has never been reported to IaaS; the recovery
    /// pass may safely re-issue `create_node` for it.
    pub fn is_pre_iaas(self) -> bool {
        self < InstanceState::Pending
    }

    /// A node in this state (or later) is live and should be included in
    /// `query_nodes`'s per-site `list_nodes` pass.
    pub fn is_live(self) -> bool {
        self >= InstanceState::Pending && self < InstanceState::Terminated
    }

    /// Dead-end states are never mutated again except by GC.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceState::Terminated | InstanceState::Failed | InstanceState::Rejected
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Health classification axis, independent of `InstanceState`. Driven by
/// heartbeat timing against the monitor's configured timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceHealthState {
    /// No heartbeat yet; instance may be terminated, booting, or monitoring
    /// disabled.
    Unknown,
    /// An `OK` heartbeat has arrived within `missing_seconds`, no errors.
    Ok,
    /// Most recent heartbeat reported an error from the supervisor itself.
    MonitorError,
    /// Most recent heartbeat reported at least one failed monitored process.
    ProcessError,
    /// Running but no heartbeat within `missing_seconds`.
    OutOfContact,
    /// `OutOfContact` for `really_missing_seconds` past a `dump_state` probe.
    Missing,
    /// Terminated but a heartbeat arrived within `zombie_seconds`.
    Zombie,
}

impl fmt::Display for InstanceHealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceHealthState::Unknown => "UNKNOWN",
            InstanceHealthState::Ok => "OK",
            InstanceHealthState::MonitorError => "MONITOR_ERROR",
            InstanceHealthState::ProcessError => "PROCESS_ERROR",
            InstanceHealthState::OutOfContact => "OUT_OF_CONTACT",
            InstanceHealthState::Missing => "MISSING",
            InstanceHealthState::Zombie => "ZOMBIE",
        };
        f.write_str(s)
    }
}

/// Coarse decision-engine status, exposed optionally by engines for
/// operator visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionEngineState {
    Pending,
    Stable,
    Unknown,
    DevmodeFailed,
}

/// Heartbeat-reported health, as sent by the OU Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatState {
    Ok,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_wire_codes() {
        let states = [
            InstanceState::Requesting,
            InstanceState::Requested,
            InstanceState::ErrorRetrying,
            InstanceState::Pending,
            InstanceState::Started,
            InstanceState::Running,
            InstanceState::RunningFailed,
            InstanceState::Terminating,
            InstanceState::Terminated,
            InstanceState::Failed,
            InstanceState::Rejected,
        ];
        for w in states.windows(2) {
            assert!(w[0] < w[1], "{:?} should sort before {:?}", w[0], w[1]);
            assert!(w[0].code() < w[1].code(), "wire codes must agree with Ord");
        }
    }

    #[test]
    fn pre_iaas_and_live_are_disjoint_at_pending() {
        assert!(InstanceState::Requested.is_pre_iaas());
        assert!(!InstanceState::Requested.is_live());
        assert!(!InstanceState::Pending.is_pre_iaas());
        assert!(InstanceState::Pending.is_live());
        assert!(!InstanceState::Terminated.is_live());
        assert!(InstanceState::Terminated.is_terminal());
    }
}
