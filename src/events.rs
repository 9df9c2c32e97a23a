use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events that can occur in the camwatch system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CamwatchEvent {
    /// A motion-start event was parsed and its alert queued
    MotionAlert {
        camera: String,
        timestamp: SystemTime,
    },
    /// A camera feed connected or dropped
    CameraStatusChanged {
        camera: String,
        connected: bool,
        timestamp: SystemTime,
    },
    /// The gateway confirmed delivery of a queued message
    AlertDelivered { timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
}

impl CamwatchEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CamwatchEvent::MotionAlert { camera, .. } => {
                format!("Motion alert from {}", camera)
            }
            CamwatchEvent::CameraStatusChanged {
                camera, connected, ..
            } => {
                format!(
                    "Camera {} {}",
                    camera,
                    if *connected {
                        "connected"
                    } else {
                        "disconnected"
                    }
                )
            }
            CamwatchEvent::AlertDelivered { .. } => "Alert delivered".to_string(),
            CamwatchEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CamwatchEvent::MotionAlert { .. } => "motion_alert",
            CamwatchEvent::CameraStatusChanged { .. } => "camera_status_changed",
            CamwatchEvent::AlertDelivered { .. } => "alert_delivered",
            CamwatchEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<CamwatchEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<CamwatchEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: CamwatchEvent) -> Result<usize, EventBusError> {
        match &event {
            CamwatchEvent::CameraStatusChanged {
                camera, connected, ..
            } => {
                if *connected {
                    info!("Camera {} connected", camera);
                } else {
                    warn!("Camera {} disconnected", camera);
                }
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
