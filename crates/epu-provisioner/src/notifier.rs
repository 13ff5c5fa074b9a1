use async_trait::async_trait;
use epu_domain::{LaunchRecord, NodeRecord};

/// Publishes state transitions to subscribers. A subscriber sees
/// notifications for a single node in non-decreasing state order but no
/// ordering guarantee across nodes, so implementations must treat updates
/// as idempotent last-writer-wins on `(node_id, state)`.
#[async_trait]
pub trait SubscriberNotifier: Send + Sync {
    async fn notify_launch(&self, launch: &LaunchRecord);
    async fn notify_node(&self, node: &NodeRecord);
}

/// Default notifier for deployments with no subscriber fan-out configured.
#[derive(Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl SubscriberNotifier for NoopNotifier {
    async fn notify_launch(&self, _launch: &LaunchRecord) {}
    async fn notify_node(&self, _node: &NodeRecord) {}
}
