use tokio::sync::broadcast;
use tracing::debug;

use crate::models::CheckResult;

/// Fan-out channel for every result the executor produces
///
/// The executor owns the only `ResultBus`, so it holds the only write handle.
/// Consumers (alert pipeline, realtime layers) call `subscribe` explicitly.
pub struct ResultBus {
    tx: broadcast::Sender<CheckResult>,
}

impl ResultBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<CheckResult>(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckResult> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn publish(&self, result: CheckResult) {
        debug!(monitor = %result.monitor_id, status = %result.status, "Result bus: publishing result");
        // No subscribers is fine, results are still returned to the caller
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_every_subscriber_receives_results() {
        let bus = ResultBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let result = CheckResult::up(Uuid::new_v4(), "ok");
        bus.publish(result.clone());

        assert_eq!(first.recv().await.unwrap(), result);
        assert_eq!(second.recv().await.unwrap(), result);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = ResultBus::new(1);
        bus.publish(CheckResult::down(Uuid::new_v4(), "unreachable"));
    }
}
