//! Delivery worker: the single consumer of the persistent queue.

use crate::events::{CamwatchEvent, EventBus};
use crate::gateway::NotificationGateway;
use crate::queue::PersistentQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Sending,
    Backoff,
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    attempts: AtomicU64,
    delivered: AtomicU64,
    failures: AtomicU64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub attempts: u64,
    pub delivered: u64,
    pub failures: u64,
}

/// Drains the queue through the gateway.
///
/// The head message is retried every `retry_interval` until the gateway
/// accepts it; only then is it removed from the queue. Delivery is therefore
/// at-least-once: a crash between acceptance and the removal flush resends
/// the message after restart.
pub struct DeliveryWorker {
    queue: Arc<PersistentQueue>,
    gateway: Arc<dyn NotificationGateway>,
    retry_interval: Duration,
    event_bus: Arc<EventBus>,
    state: watch::Sender<DeliveryState>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryWorker {
    pub fn new(
        queue: Arc<PersistentQueue>,
        gateway: Arc<dyn NotificationGateway>,
        retry_interval: Duration,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(DeliveryState::Idle);
        Self {
            queue,
            gateway,
            retry_interval,
            event_bus,
            state,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn state(&self) -> watch::Receiver<DeliveryState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver queued messages until `cancel` fires. A send already in
    /// flight is allowed to finish; waits are abandoned immediately.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting delivery worker via {} gateway",
            self.gateway.name()
        );

        'worker: loop {
            self.state.send_replace(DeliveryState::Idle);
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.queue.dequeue_blocking() => message,
            };

            loop {
                self.state.send_replace(DeliveryState::Sending);
                let attempt = self.stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Delivery attempt {}", attempt);

                match self.gateway.send(&message).await {
                    Ok(()) => {
                        self.on_delivered().await;
                        break;
                    }
                    Err(e) => {
                        self.stats.failures.fetch_add(1, Ordering::Relaxed);
                        self.state.send_replace(DeliveryState::Backoff);
                        warn!(
                            "Failed to deliver message: {}. Retrying in {:?}",
                            e, self.retry_interval
                        );

                        tokio::select! {
                            _ = cancel.cancelled() => break 'worker,
                            _ = tokio::time::sleep(self.retry_interval) => {}
                        }
                    }
                }
            }
        }

        info!("Delivery worker stopped");
    }

    async fn on_delivered(&self) {
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);

        match self.queue.flush_after_delivery().await {
            Ok(_) => info!(
                "Message delivered, {} still pending",
                self.queue.len().await
            ),
            Err(e) => {
                error!("Delivered message could not be removed durably: {}", e);
                self.publish(CamwatchEvent::SystemError {
                    component: "queue".to_string(),
                    error: e.to_string(),
                })
                .await;
            }
        }

        self.publish(CamwatchEvent::AlertDelivered {
            timestamp: SystemTime::now(),
        })
        .await;
    }

    async fn publish(&self, event: CamwatchEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("No subscribers for delivery event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// Fails the first `failures` sends, then accepts everything
    struct ScriptedGateway {
        failures: AtomicUsize,
        attempts: Mutex<Vec<String>>,
        accepted: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(times),
                attempts: Mutex::new(Vec::new()),
                accepted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationGateway for ScriptedGateway {
        async fn send(&self, message: &str) -> Result<(), GatewayError> {
            self.attempts.lock().await.push(message.to_string());

            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(GatewayError::Rejected {
                    status: 502,
                    body: "Bad Gateway".to_string(),
                });
            }

            self.accepted.lock().await.push(message.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn spawn_worker(
        queue: Arc<PersistentQueue>,
        gateway: Arc<ScriptedGateway>,
    ) -> (
        Arc<DeliveryStats>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let worker = DeliveryWorker::new(
            queue,
            gateway,
            Duration::from_millis(20),
            Arc::new(EventBus::default()),
        );
        let stats = worker.stats();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));
        (stats, cancel, handle)
    }

    async fn wait_for_delivered(stats: &DeliveryStats, count: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.snapshot().delivered < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("messages should be delivered");
    }

    #[tokio::test]
    async fn test_failed_sends_are_retried_until_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let queue = Arc::new(PersistentQueue::new(&path));
        queue.enqueue("m1".to_string()).await.unwrap();

        let gateway = ScriptedGateway::failing(3);
        let (stats, cancel, handle) = spawn_worker(Arc::clone(&queue), Arc::clone(&gateway));

        wait_for_delivered(&stats, 1).await;

        assert_eq!(*gateway.attempts.lock().await, vec!["m1"; 4]);
        assert_eq!(*gateway.accepted.lock().await, vec!["m1"]);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 4);
        assert_eq!(snapshot.failures, 3);
        assert!(queue.is_empty().await);

        let restored = PersistentQueue::load(&path).await;
        assert!(restored.is_empty().await);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_delivered_in_fifo_order() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(PersistentQueue::new(temp_dir.path().join("queue.json")));
        let gateway = ScriptedGateway::failing(1);
        let (stats, cancel, handle) = spawn_worker(Arc::clone(&queue), Arc::clone(&gateway));

        for message in ["m1", "m2", "m3"] {
            queue.enqueue(message.to_string()).await.unwrap();
        }
        wait_for_delivered(&stats, 3).await;

        assert_eq!(*gateway.accepted.lock().await, vec!["m1", "m2", "m3"]);
        assert_eq!(*gateway.attempts.lock().await, vec!["m1", "m1", "m2", "m3"]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_message_survives_crash_and_is_delivered_after_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");

        // First process: enqueue and die without any further flush
        let queue = PersistentQueue::new(&path);
        queue.enqueue("m1".to_string()).await.unwrap();
        drop(queue);

        // Second process
        let queue = Arc::new(PersistentQueue::load(&path).await);
        let gateway = ScriptedGateway::failing(0);
        let (stats, cancel, handle) = spawn_worker(Arc::clone(&queue), Arc::clone(&gateway));

        wait_for_delivered(&stats, 1).await;
        assert_eq!(*gateway.accepted.lock().await, vec!["m1"]);
        assert!(PersistentQueue::load(&path).await.is_empty().await);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_backoff() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let queue = Arc::new(PersistentQueue::new(&path));
        queue.enqueue("m1".to_string()).await.unwrap();

        let gateway = ScriptedGateway::failing(usize::MAX);
        let worker = DeliveryWorker::new(
            Arc::clone(&queue),
            gateway,
            Duration::from_secs(3600),
            Arc::new(EventBus::default()),
        );
        let mut state = worker.state();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == DeliveryState::Backoff),
        )
        .await
        .unwrap()
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should stop while backing off")
            .unwrap();

        // Undelivered message is still pending
        assert_eq!(
            PersistentQueue::load(&path).await.snapshot().await,
            vec!["m1"]
        );
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let temp_dir = TempDir::new().unwrap();
        let queue = Arc::new(PersistentQueue::new(temp_dir.path().join("queue.json")));
        let (_stats, cancel, handle) = spawn_worker(queue, ScriptedGateway::failing(0));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("idle worker should stop")
            .unwrap();
    }
}
