use std::collections::HashMap;
use std::fs;

use async_trait::async_trait;
use epu_domain::FailedProcess;
use thiserror::Error;
use tracing::warn;

/// States supervisord (or whatever backs a `ProcessSupervisor`) considers a
/// process to be running normally in.
const RUNNING_STATES: &[&str] = &["STARTING", "RUNNING"];

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor query failed: {0}")]
    Query(String),
}

/// One process as reported by the local supervisor, mirroring supervisord's
/// `getAllProcessInfo()` shape closely enough to drive failure detection.
#[derive(Debug, Clone)]
pub struct ProcessStatus {
    pub name: String,
    pub state: String,
    pub statename: String,
    pub exitstatus: Option<i32>,
    pub stop: Option<i64>,
    pub spawnerr: Option<String>,
    pub stderr_logfile: Option<String>,
}

/// The contract an OU Agent polls. A real implementation talks to
/// supervisord's XML-RPC socket; tests and local runs use a canned list.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn query(&self) -> Result<Vec<ProcessStatus>, SupervisorError>;
}

/// Detects process failures against a supervisor, remembering each failure's
/// identity so repeated heartbeats during an unchanged failure skip the
/// costly `stderr` read.
pub struct FailureDetector {
    fail_cache: HashMap<String, FailedProcess>,
}

impl FailureDetector {
    pub fn new() -> Self {
        FailureDetector { fail_cache: HashMap::new() }
    }

    /// Returns `None` if no process supervisor is configured (the OU Agent
    /// still heartbeats `OK` in that case, per the distilled system's
    /// `core=None` allowance), otherwise `Some(failed_processes)`, empty if
    /// every tracked process is healthy.
    pub async fn check(&mut self, supervisor: &dyn ProcessSupervisor) -> Result<Vec<FailedProcess>, SupervisorError> {
        let procs = supervisor.query().await?;
        let mut failed = Vec::new();
        for proc in procs {
            if RUNNING_STATES.contains(&proc.state.as_str()) {
                self.fail_cache.remove(&proc.name);
                continue;
            }
            failed.push(self.record_failure(&proc));
        }
        Ok(failed)
    }

    fn record_failure(&mut self, proc: &ProcessStatus) -> FailedProcess {
        let candidate = FailedProcess {
            name: proc.name.clone(),
            state: proc.state.clone(),
            statename: proc.statename.clone(),
            exitcode: proc.exitstatus,
            stop_timestamp: proc.stop,
            error: proc.spawnerr.clone(),
            stderr: None,
        };

        if let Some(prev) = self.fail_cache.get(&proc.name) {
            if prev.cache_key() == candidate.cache_key() {
                return prev.clone();
            }
        }

        let mut stored = candidate.clone();
        self.fail_cache.insert(proc.name.clone(), stored.clone());

        // stderr is attached on the returned copy only, the first time a
        // given failure is observed; the cached copy stays detail-free.
        stored.stderr = proc.stderr_logfile.as_deref().and_then(read_stderr);
        stored
    }
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn read_stderr(path: &str) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) => {
            warn!(path, error = %e, "failed to read process stderr log");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(name: &str, state: &str) -> ProcessStatus {
        ProcessStatus {
            name: name.into(),
            state: state.into(),
            statename: state.into(),
            exitstatus: Some(1),
            stop: Some(10),
            spawnerr: None,
            stderr_logfile: None,
        }
    }

    struct FixedSupervisor(Vec<ProcessStatus>);

    #[async_trait]
    impl ProcessSupervisor for FixedSupervisor {
        async fn query(&self) -> Result<Vec<ProcessStatus>, SupervisorError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn running_process_reports_no_failure() {
        let sup = FixedSupervisor(vec![proc("worker", "RUNNING")]);
        let mut detector = FailureDetector::new();
        let failed = detector.check(&sup).await.unwrap();
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_failure_reuses_cached_record() {
        let sup = FixedSupervisor(vec![proc("worker", "EXITED")]);
        let mut detector = FailureDetector::new();
        let first = detector.check(&sup).await.unwrap();
        let second = detector.check(&sup).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].cache_key(), second[0].cache_key());
    }

    #[tokio::test]
    async fn recovery_clears_cached_failure() {
        let mut detector = FailureDetector::new();
        let failing = FixedSupervisor(vec![proc("worker", "EXITED")]);
        detector.check(&failing).await.unwrap();

        let healthy = FixedSupervisor(vec![proc("worker", "RUNNING")]);
        let failed = detector.check(&healthy).await.unwrap();
        assert!(failed.is_empty());
    }
}
