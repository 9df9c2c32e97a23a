use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CamwatchConfig {
    /// Cameras to watch, one stream listener each
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    pub listener: ListenerConfig,
    pub gateway: GatewayConfig,
    pub delivery: DeliveryConfig,
    pub queue: QueueConfig,
    pub bookkeeping: BookkeepingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Display name, used as the alert source label
    pub name: String,

    /// Event feed URL (eventManager.cgi attach endpoint)
    pub url: String,

    /// Feed credentials
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListenerConfig {
    /// Literal substring separating events in the feed
    #[serde(default = "default_boundary")]
    pub boundary: String,

    /// Connect timeout, also the longest silence tolerated between reads
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Wait between a failed connection and the next attempt
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_seconds: u64,

    /// Queue a one-shot "camera offline" alert per outage
    #[serde(default = "default_offline_notification")]
    pub offline_notification: bool,

    /// Consecutive failed attempts before an outage is reported
    #[serde(default = "default_offline_after_failures")]
    pub offline_after_failures: u32,

    /// Longest line, or text between two boundaries, kept before it is discarded
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,

    /// First line of every rendered motion alert
    #[serde(default = "default_alert_title")]
    pub alert_title: String,

    /// Optional site name appended to the alert title
    #[serde(default)]
    pub site_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    /// Bot API base URL
    #[serde(default = "default_gateway_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub bot_token: String,

    /// Destination chat identifier
    #[serde(default)]
    pub chat_id: String,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeliveryConfig {
    /// Wait before re-sending a message the gateway refused
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// JSON artifact mirroring the pending queue
    #[serde(default = "default_queue_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BookkeepingConfig {
    #[serde(default = "default_bookkeeping_enabled")]
    pub enabled: bool,

    /// Append-only log receiving per-camera alert tallies
    #[serde(default = "default_alert_log_path")]
    pub log_path: String,

    /// Interval between tally snapshots (tallies reset after each)
    #[serde(default = "default_reset_interval")]
    pub reset_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log file written next to console output; empty disables it
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl ListenerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_seconds)
    }
}

impl DeliveryConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }
}

impl CamwatchConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("listener.boundary", default_boundary())?
            .set_default(
                "listener.connect_timeout_seconds",
                default_connect_timeout(),
            )?
            .set_default(
                "listener.reconnect_backoff_seconds",
                default_reconnect_backoff(),
            )?
            .set_default(
                "listener.offline_notification",
                default_offline_notification(),
            )?
            .set_default(
                "listener.offline_after_failures",
                default_offline_after_failures(),
            )?
            .set_default(
                "listener.max_buffer_bytes",
                default_max_buffer_bytes() as u64,
            )?
            .set_default("listener.alert_title", default_alert_title())?
            .set_default("listener.site_name", "")?
            .set_default("gateway.api_base", default_gateway_api_base())?
            .set_default("gateway.bot_token", "")?
            .set_default("gateway.chat_id", "")?
            .set_default("gateway.timeout_seconds", default_gateway_timeout())?
            .set_default(
                "delivery.retry_interval_seconds",
                default_retry_interval(),
            )?
            .set_default("queue.path", default_queue_path())?
            .set_default("bookkeeping.enabled", default_bookkeeping_enabled())?
            .set_default("bookkeeping.log_path", default_alert_log_path())?
            .set_default(
                "bookkeeping.reset_interval_seconds",
                default_reset_interval(),
            )?
            .set_default("logging.file", default_log_file())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. CAMWATCH_GATEWAY__BOT_TOKEN
            .add_source(
                Environment::with_prefix("CAMWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CamwatchConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} camera(s))",
            config.cameras.len()
        );
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera must be configured".to_string(),
            ));
        }

        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Camera name must not be empty".to_string(),
                ));
            }
            if let Err(e) = reqwest::Url::parse(&camera.url) {
                return Err(ConfigError::Message(format!(
                    "Camera '{}' has an invalid url: {}",
                    camera.name, e
                )));
            }
        }

        if self.listener.boundary.is_empty() {
            return Err(ConfigError::Message(
                "Listener boundary must not be empty".to_string(),
            ));
        }

        if self.listener.connect_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Listener connect_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.listener.reconnect_backoff_seconds == 0 {
            return Err(ConfigError::Message(
                "Listener reconnect_backoff_seconds must be greater than 0".to_string(),
            ));
        }

        if self.listener.offline_after_failures == 0 {
            return Err(ConfigError::Message(
                "Listener offline_after_failures must be at least 1".to_string(),
            ));
        }

        if self.listener.max_buffer_bytes == 0 {
            return Err(ConfigError::Message(
                "Listener max_buffer_bytes must be greater than 0".to_string(),
            ));
        }

        if self.gateway.bot_token.is_empty() || self.gateway.chat_id.is_empty() {
            return Err(ConfigError::Message(
                "Gateway bot_token and chat_id are required".to_string(),
            ));
        }

        if self.gateway.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Gateway timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.delivery.retry_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Delivery retry_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.queue.path.is_empty() {
            return Err(ConfigError::Message(
                "Queue path must not be empty".to_string(),
            ));
        }

        if self.bookkeeping.enabled && self.bookkeeping.reset_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Bookkeeping reset_interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy with secrets masked, for logging
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for camera in &mut copy.cameras {
            if !camera.password.is_empty() {
                camera.password = "***".to_string();
            }
        }
        if !copy.gateway.bot_token.is_empty() {
            copy.gateway.bot_token = "***".to_string();
        }
        copy
    }
}

impl Default for CamwatchConfig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            listener: ListenerConfig {
                boundary: default_boundary(),
                connect_timeout_seconds: default_connect_timeout(),
                reconnect_backoff_seconds: default_reconnect_backoff(),
                offline_notification: default_offline_notification(),
                offline_after_failures: default_offline_after_failures(),
                max_buffer_bytes: default_max_buffer_bytes(),
                alert_title: default_alert_title(),
                site_name: String::new(),
            },
            gateway: GatewayConfig {
                api_base: default_gateway_api_base(),
                bot_token: String::new(),
                chat_id: String::new(),
                timeout_seconds: default_gateway_timeout(),
            },
            delivery: DeliveryConfig {
                retry_interval_seconds: default_retry_interval(),
            },
            queue: QueueConfig {
                path: default_queue_path(),
            },
            bookkeeping: BookkeepingConfig {
                enabled: default_bookkeeping_enabled(),
                log_path: default_alert_log_path(),
                reset_interval_seconds: default_reset_interval(),
            },
            logging: LoggingConfig {
                file: default_log_file(),
            },
        }
    }
}

// Default value functions
fn default_boundary() -> String {
    "--myboundary".to_string()
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_reconnect_backoff() -> u64 {
    10
}
fn default_offline_notification() -> bool {
    true
}
fn default_offline_after_failures() -> u32 {
    2
}
fn default_max_buffer_bytes() -> usize {
    1024 * 1024
}
fn default_alert_title() -> String {
    "Motion Detected".to_string()
}

fn default_gateway_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_gateway_timeout() -> u64 {
    10
}

fn default_retry_interval() -> u64 {
    60
}

fn default_queue_path() -> String {
    "queue.json".to_string()
}

fn default_bookkeeping_enabled() -> bool {
    true
}
fn default_alert_log_path() -> String {
    "alert_counts.log".to_string()
}
fn default_reset_interval() -> u64 {
    300
}

fn default_log_file() -> String {
    "camera_monitor.log".to_string()
}
