use super::orchestrator::listener_component;
use super::{ComponentState, Supervisor};
use crate::bookkeeping::AlertBookkeeper;
use crate::delivery::DeliveryWorker;
use crate::error::Result;
use crate::feed::StreamListener;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

impl Supervisor {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing camwatch components");

        let mut states = self.component_states.lock().await;
        states.insert("delivery".to_string(), ComponentState::Stopped);
        if self.config.bookkeeping.enabled {
            states.insert("bookkeeping".to_string(), ComponentState::Stopped);
        }
        for camera in &self.config.cameras {
            states.insert(listener_component(&camera.name), ComponentState::Stopped);
        }
        drop(states);

        info!(
            "{} camera(s) configured, {} message(s) pending delivery",
            self.config.cameras.len(),
            self.queue.len().await
        );
        Ok(())
    }

    /// Spawn the delivery worker, the bookkeeper and one listener per camera
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting camwatch");

        // Delivery first so restored messages start draining immediately
        self.set_component_state("delivery", ComponentState::Starting)
            .await;
        let worker = DeliveryWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.gateway),
            self.config.delivery.retry_interval(),
            Arc::clone(&self.event_bus),
        );
        let handle = tokio::spawn(worker.run(self.cancellation_token.child_token()));
        self.tasks.push(("delivery".to_string(), handle));
        self.set_component_state("delivery", ComponentState::Running)
            .await;

        if self.config.bookkeeping.enabled {
            self.set_component_state("bookkeeping", ComponentState::Starting)
                .await;
            let bookkeeper = AlertBookkeeper::new(
                &self.config.bookkeeping.log_path,
                Duration::from_secs(self.config.bookkeeping.reset_interval_seconds),
                &self.event_bus,
            );
            let handle = tokio::spawn(bookkeeper.run(self.cancellation_token.child_token()));
            self.tasks.push(("bookkeeping".to_string(), handle));
            self.set_component_state("bookkeeping", ComponentState::Running)
                .await;
        }

        for camera in self.config.cameras.clone() {
            let component = listener_component(&camera.name);
            self.set_component_state(&component, ComponentState::Starting)
                .await;

            let listener = match StreamListener::new(
                camera,
                &self.config.listener,
                Arc::clone(&self.queue),
                Arc::clone(&self.event_bus),
            ) {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to create {}: {}", component, e);
                    self.set_component_state(&component, ComponentState::Failed)
                        .await;
                    return Err(e);
                }
            };

            let handle = tokio::spawn(listener.run(self.cancellation_token.child_token()));
            self.tasks.push((component.clone(), handle));
            self.set_component_state(&component, ComponentState::Running)
                .await;
        }

        info!("Camwatch started with {} task(s)", self.tasks.len());
        Ok(())
    }
}
