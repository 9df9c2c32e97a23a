//! Outbound notification transport.

mod telegram;

pub use telegram::TelegramGateway;

use crate::error::GatewayError;
use async_trait::async_trait;

/// Delivers one rendered alert to its human audience.
///
/// A call either succeeds or fails as a whole; the delivery worker decides
/// what to do about failures.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), GatewayError>;

    fn name(&self) -> &str;
}
