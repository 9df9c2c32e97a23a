use super::client::FeedClient;
use super::framing::{LineSplitter, StreamBuffer};
use crate::config::{CameraConfig, ListenerConfig};
use crate::error::{FeedError, Result};
use crate::events::{CamwatchEvent, EventBus};
use crate::parser::{self, AlertTemplate};
use crate::queue::PersistentQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state of one camera feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Connecting,
    Streaming,
    Error,
}

/// Counters for one listener
#[derive(Debug, Default)]
pub struct ListenerStats {
    connect_attempts: AtomicU64,
    backoff_cycles: AtomicU64,
    boundaries: AtomicU64,
    alerts_queued: AtomicU64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            backoff_cycles: self.backoff_cycles.load(Ordering::Relaxed),
            boundaries: self.boundaries.load(Ordering::Relaxed),
            alerts_queued: self.alerts_queued.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStatsSnapshot {
    pub connect_attempts: u64,
    pub backoff_cycles: u64,
    pub boundaries: u64,
    pub alerts_queued: u64,
}

/// Reconnecting reader for one camera's event feed.
///
/// Runs `CONNECTING -> STREAMING -> ERROR -> CONNECTING` until cancelled. Every
/// boundary hands the accumulated buffer to the parser and empties it; motion
/// alerts go into the shared queue.
pub struct StreamListener {
    camera: CameraConfig,
    boundary: String,
    template: AlertTemplate,
    backoff: Duration,
    offline_notification: bool,
    offline_after_failures: u32,
    max_buffer_bytes: usize,
    client: FeedClient,
    queue: Arc<PersistentQueue>,
    event_bus: Arc<EventBus>,
    state: watch::Sender<ListenerState>,
    stats: Arc<ListenerStats>,
    consecutive_failures: u32,
    reported_offline: bool,
}

impl StreamListener {
    pub fn new(
        camera: CameraConfig,
        config: &ListenerConfig,
        queue: Arc<PersistentQueue>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let client = FeedClient::new(config.connect_timeout())?;
        let template = AlertTemplate::new(config.alert_title.clone()).with_site(config.site_name.clone());
        let (state, _) = watch::channel(ListenerState::Connecting);

        Ok(Self {
            camera,
            boundary: config.boundary.clone(),
            template,
            backoff: config.reconnect_backoff(),
            offline_notification: config.offline_notification,
            offline_after_failures: config.offline_after_failures,
            max_buffer_bytes: config.max_buffer_bytes,
            client,
            queue,
            event_bus,
            state,
            stats: Arc::new(ListenerStats::default()),
            consecutive_failures: 0,
            reported_offline: false,
        })
    }

    /// Watch the listener's state from another task
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the reconnect loop until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting stream listener for {}", self.camera.name);

        while !cancel.is_cancelled() {
            self.state.send_replace(ListenerState::Connecting);
            self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);

            let Some(failure) = self.stream_once(&cancel).await else {
                break;
            };

            self.state.send_replace(ListenerState::Error);
            error!(
                "Stream from {} failed: {}. Reconnecting in {:?}",
                self.camera.name, failure, self.backoff
            );
            self.on_failure().await;
            self.stats.backoff_cycles.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        info!("Stream listener for {} stopped", self.camera.name);
    }

    /// Connect and read until the feed fails, or `None` once cancelled.
    ///
    /// Only network waits are raced against `cancel`. Boundary handling,
    /// including the queue write, always runs to completion so shutdown
    /// never abandons a snapshot write halfway.
    async fn stream_once(&mut self, cancel: &CancellationToken) -> Option<FeedError> {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return None,
            connected = self.client.connect(&self.camera) => connected,
        };
        let mut stream = match connected {
            Ok(stream) => stream,
            Err(e) => return Some(e),
        };
        self.on_connected().await;

        let mut lines = LineSplitter::new(self.max_buffer_bytes);
        let mut buffer = StreamBuffer::new(self.boundary.clone(), self.max_buffer_bytes);

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return None,
                chunk = stream.next_chunk() => chunk,
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Some(e),
            };

            for line in lines.push(&chunk) {
                debug!("{}: {}", self.camera.name, line);
                if let Some(text) = buffer.push_line(&line) {
                    self.handle_boundary(&text).await;
                }
            }
        }
    }

    async fn handle_boundary(&self, text: &str) {
        self.stats.boundaries.fetch_add(1, Ordering::Relaxed);

        let Some(message) = parser::parse_with_template(text, &self.camera.name, &self.template)
        else {
            return;
        };

        info!("Motion detected on {}", self.camera.name);
        if let Err(e) = self.queue.enqueue(message).await {
            error!("Failed to persist alert from {}: {}", self.camera.name, e);
            self.publish(CamwatchEvent::SystemError {
                component: "queue".to_string(),
                error: e.to_string(),
            })
            .await;
        }
        self.stats.alerts_queued.fetch_add(1, Ordering::Relaxed);

        self.publish(CamwatchEvent::MotionAlert {
            camera: self.camera.name.clone(),
            timestamp: SystemTime::now(),
        })
        .await;
    }

    async fn on_connected(&mut self) {
        self.state.send_replace(ListenerState::Streaming);

        if self.reported_offline {
            info!("{} is back online", self.camera.name);
        }
        self.consecutive_failures = 0;
        self.reported_offline = false;

        self.publish(CamwatchEvent::CameraStatusChanged {
            camera: self.camera.name.clone(),
            connected: true,
            timestamp: SystemTime::now(),
        })
        .await;
    }

    /// Count the failure and report the outage once it has lasted long enough.
    /// At most one report per outage.
    async fn on_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.reported_offline || self.consecutive_failures < self.offline_after_failures {
            return;
        }
        self.reported_offline = true;

        warn!(
            "{} unreachable after {} attempts",
            self.camera.name, self.consecutive_failures
        );
        self.publish(CamwatchEvent::CameraStatusChanged {
            camera: self.camera.name.clone(),
            connected: false,
            timestamp: SystemTime::now(),
        })
        .await;

        if self.offline_notification {
            let message = offline_message(&self.camera.name);
            if let Err(e) = self.queue.enqueue(message).await {
                error!(
                    "Failed to persist offline notice for {}: {}",
                    self.camera.name, e
                );
            }
        }
    }

    async fn publish(&self, event: CamwatchEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("No subscribers for listener event: {}", e);
        }
    }
}

pub fn offline_message(camera: &str) -> String {
    format!("{} camera is offline", camera)
}
