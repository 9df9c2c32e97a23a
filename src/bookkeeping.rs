//! Per-camera alert tallies, written to an append-only log and reset on a
//! fixed interval.
//!
//! The bookkeeper owns all tallies and learns about alerts only through
//! [`CamwatchEvent::MotionAlert`] events, so listeners never touch shared
//! counters.

use crate::error::{CamwatchError, Result};
use crate::events::{CamwatchEvent, EventBus};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Alert counts for one camera since the last reset.
///
/// `gap_N_sec` counts alerts arriving at least N seconds after the previous
/// alert counted by the same counter, which folds bursts into one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertTally {
    pub simple_count: u64,
    pub gap_10_sec: u64,
    pub gap_30_sec: u64,
    pub gap_60_sec: u64,
    pub last_10_sec: Option<DateTime<Local>>,
    pub last_30_sec: Option<DateTime<Local>>,
    pub last_60_sec: Option<DateTime<Local>>,
}

impl AlertTally {
    pub fn record(&mut self, at: DateTime<Local>) {
        self.simple_count += 1;
        count_with_gap(&mut self.gap_10_sec, &mut self.last_10_sec, at, 10);
        count_with_gap(&mut self.gap_30_sec, &mut self.last_30_sec, at, 30);
        count_with_gap(&mut self.gap_60_sec, &mut self.last_60_sec, at, 60);
    }
}

fn count_with_gap(
    count: &mut u64,
    last: &mut Option<DateTime<Local>>,
    at: DateTime<Local>,
    gap_seconds: i64,
) {
    let counted = match last {
        Some(previous) => (at - *previous).num_seconds() >= gap_seconds,
        None => true,
    };

    if counted {
        *count += 1;
        *last = Some(at);
    }
}

#[derive(Debug, Serialize)]
struct TallyRecord<'a> {
    timestamp: String,
    cameras: &'a BTreeMap<String, AlertTally>,
}

pub struct AlertBookkeeper {
    log_path: PathBuf,
    reset_interval: Duration,
    tallies: BTreeMap<String, AlertTally>,
    events: broadcast::Receiver<CamwatchEvent>,
}

impl AlertBookkeeper {
    /// Subscribes immediately so alerts published before `run` are counted
    pub fn new<P: AsRef<Path>>(log_path: P, reset_interval: Duration, event_bus: &EventBus) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
            reset_interval,
            tallies: BTreeMap::new(),
            events: event_bus.subscribe(),
        }
    }

    pub fn record(&mut self, camera: &str, at: SystemTime) {
        self.tallies
            .entry(camera.to_string())
            .or_default()
            .record(DateTime::<Local>::from(at));
    }

    pub fn tallies(&self) -> &BTreeMap<String, AlertTally> {
        &self.tallies
    }

    /// Append the current tallies to the log as one JSON line, then reset them
    pub async fn rotate(&mut self) -> Result<()> {
        let record = TallyRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            cameras: &self.tallies,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(|e| {
                CamwatchError::component(
                    "bookkeeping",
                    &format!("Failed to open {}: {}", self.log_path.display(), e),
                )
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(
            "Wrote alert tallies for {} camera(s) to {}",
            self.tallies.len(),
            self.log_path.display()
        );
        self.tallies.clear();
        Ok(())
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Starting alert bookkeeping, reset every {:?}",
            self.reset_interval
        );

        let mut ticker = interval_at(Instant::now() + self.reset_interval, self.reset_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.rotate().await {
                        error!("Failed to write alert tallies: {}", e);
                    }
                }
                event = self.events.recv() => match event {
                    Ok(CamwatchEvent::MotionAlert { camera, timestamp }) => {
                        self.record(&camera, timestamp);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Bookkeeping missed {} event(s)", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        if !self.tallies.is_empty() {
            if let Err(e) = self.rotate().await {
                error!("Failed to write final alert tallies: {}", e);
            }
        }
        info!("Alert bookkeeping stopped");
    }
}
