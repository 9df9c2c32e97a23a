pub mod bookkeeping;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod feed;
pub mod gateway;
pub mod parser;
pub mod queue;
pub mod supervisor;

pub use bookkeeping::{AlertBookkeeper, AlertTally};
pub use config::CamwatchConfig;
pub use delivery::{DeliveryState, DeliveryWorker};
pub use error::{CamwatchError, Result};
pub use events::{CamwatchEvent, EventBus};
pub use feed::{ListenerState, StreamListener};
pub use gateway::{NotificationGateway, TelegramGateway};
pub use queue::PersistentQueue;
pub use supervisor::{ComponentState, ShutdownReason, ShutdownTrigger, Supervisor};
