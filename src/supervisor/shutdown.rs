use super::{ComponentState, Supervisor};
use crate::error::{CamwatchError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

/// Longest wait for one task after cancellation. Covers an in-flight gateway
/// call, which is allowed to finish.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

impl Supervisor {
    /// Cancel every task, wait for them, then flush the queue one last time
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // Listeners stop first so nothing is enqueued behind the final flush
        let mut tasks = std::mem::take(&mut self.tasks);
        tasks.reverse();
        for (component, handle) in tasks {
            if let Err(e) = self.stop_component(&component, handle).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        match self.queue.flush().await {
            Ok(()) => info!(
                "Final queue flush: {} message(s) pending in {}",
                self.queue.len().await,
                self.queue.path().display()
            ),
            Err(e) => {
                error!("Final queue flush failed: {}", e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(
        &self,
        component: &str,
        mut handle: tokio::task::JoinHandle<()>,
    ) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(CamwatchError::component(component, &format!("task failed: {}", e)))
            }
            Err(_) => {
                handle.abort();
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(CamwatchError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
