use super::*;
use crate::config::{CameraConfig, CamwatchConfig};
use crate::error::GatewayError;
use crate::gateway::NotificationGateway;
use crate::queue::PersistentQueue;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(&self, message: &str) -> Result<(), GatewayError> {
        self.sent.lock().await.push(message.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn create_test_config(temp_dir: &TempDir) -> CamwatchConfig {
    // Nothing listens on this port, so the listener just keeps reconnecting
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let mut config = CamwatchConfig::default();
    config.cameras.push(CameraConfig {
        name: "Porch".to_string(),
        url: format!("http://{}/cgi-bin/eventManager.cgi?action=attach", addr),
        username: "admin".to_string(),
        password: "pw".to_string(),
    });
    config.listener.offline_notification = false;
    config.gateway.bot_token = "token".to_string();
    config.gateway.chat_id = "42".to_string();
    config.delivery.retry_interval_seconds = 1;
    config.queue.path = temp_dir
        .path()
        .join("queue.json")
        .to_string_lossy()
        .into_owned();
    config.bookkeeping.log_path = temp_dir
        .path()
        .join("alert_counts.log")
        .to_string_lossy()
        .into_owned();
    config
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let temp_dir = TempDir::new().unwrap();
    let mut supervisor = Supervisor::with_gateway(
        create_test_config(&temp_dir),
        Arc::new(RecordingGateway::default()),
    )
    .await;

    assert!(supervisor.get_all_component_states().await.is_empty());
    supervisor.initialize().await.unwrap();

    let states = supervisor.get_all_component_states().await;
    assert_eq!(states.len(), 3);
    assert_eq!(states.get("delivery"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("bookkeeping"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("listener:Porch"), Some(&ComponentState::Stopped));
}

#[tokio::test]
async fn test_bookkeeping_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&temp_dir);
    config.bookkeeping.enabled = false;

    let mut supervisor =
        Supervisor::with_gateway(config, Arc::new(RecordingGateway::default())).await;
    supervisor.initialize().await.unwrap();

    assert_eq!(supervisor.get_component_state("bookkeeping").await, None);
}

#[tokio::test]
async fn test_restored_messages_are_delivered_and_shutdown_flushes() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);

    // Left behind by a previous process
    std::fs::write(&config.queue.path, "[\"m1\", \"m2\"]").unwrap();

    let gateway = Arc::new(RecordingGateway::default());
    let mut supervisor = Supervisor::with_gateway(config.clone(), gateway.clone()).await;
    assert_eq!(supervisor.queue().len().await, 2);

    supervisor.initialize().await.unwrap();
    supervisor.start().await.unwrap();

    let states = supervisor.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Running));

    tokio::time::timeout(Duration::from_secs(5), async {
        while gateway.sent.lock().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("restored messages should be delivered");
    assert_eq!(*gateway.sent.lock().await, vec!["m1", "m2"]);

    supervisor
        .shutdown_trigger()
        .trigger(ShutdownReason::UserRequest)
        .await;
    let exit_code = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("shutdown should not hang")
        .unwrap();
    assert_eq!(exit_code, 0);

    let states = supervisor.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));

    let restored = PersistentQueue::load(&config.queue.path).await;
    assert!(restored.is_empty().await);
}

#[tokio::test]
async fn test_shutdown_persists_undelivered_messages() {
    struct DownGateway;

    #[async_trait]
    impl NotificationGateway for DownGateway {
        async fn send(&self, _message: &str) -> Result<(), GatewayError> {
            Err(GatewayError::Rejected {
                status: 503,
                body: String::new(),
            })
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let mut supervisor = Supervisor::with_gateway(config.clone(), Arc::new(DownGateway)).await;
    supervisor.initialize().await.unwrap();
    supervisor.start().await.unwrap();

    supervisor
        .queue()
        .enqueue("pending".to_string())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let exit_code = tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
        .await
        .expect("backoff sleep should not block shutdown")
        .unwrap();
    assert_eq!(exit_code, 0);

    let restored = PersistentQueue::load(&config.queue.path).await;
    assert_eq!(restored.snapshot().await, vec!["pending"]);
}

#[tokio::test]
async fn test_second_trigger_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let mut supervisor = Supervisor::with_gateway(
        create_test_config(&temp_dir),
        Arc::new(RecordingGateway::default()),
    )
    .await;

    let trigger = supervisor.shutdown_trigger();
    trigger.trigger(ShutdownReason::UserRequest).await;
    trigger
        .trigger(ShutdownReason::Signal("SIGTERM".to_string()))
        .await;

    let exit_code = supervisor.run().await.unwrap();
    assert_eq!(exit_code, 0);

    // The receiver is consumed by the first run
    assert!(supervisor.run().await.is_err());
}
