use super::runtime::ShutdownTrigger;
use super::types::{ComponentState, ShutdownReason};
use crate::config::CamwatchConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::gateway::{NotificationGateway, TelegramGateway};
use crate::queue::PersistentQueue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the shared queue and runs the delivery worker, the bookkeeper and one
/// stream listener per camera until told to stop.
pub struct Supervisor {
    pub(super) config: CamwatchConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) queue: Arc<PersistentQueue>,
    pub(super) gateway: Arc<dyn NotificationGateway>,

    /// Spawned components in start order
    pub(super) tasks: Vec<(String, JoinHandle<()>)>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl Supervisor {
    /// Create a supervisor delivering through the configured Bot API gateway
    pub async fn new(config: CamwatchConfig) -> Result<Self> {
        let gateway = Arc::new(TelegramGateway::new(&config.gateway)?);
        Ok(Self::with_gateway(config, gateway).await)
    }

    /// Create a supervisor delivering through `gateway`. Restores the queue
    /// from its artifact.
    pub async fn with_gateway(config: CamwatchConfig, gateway: Arc<dyn NotificationGateway>) -> Self {
        let queue = Arc::new(PersistentQueue::load(&config.queue.path).await);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            event_bus: Arc::new(EventBus::default()),
            queue,
            gateway,
            tasks: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: ShutdownTrigger::new(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> Arc<PersistentQueue> {
        Arc::clone(&self.queue)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Handle that stops [`run`](Self::run) from another task
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_sender.clone()
    }
}

pub(super) fn listener_component(camera: &str) -> String {
    format!("listener:{}", camera)
}
