//! Delivery of session events to notification channels.
//!
//! The monitor only guarantees at most one open event per session; how an
//! event is rendered and where it goes is up to each [`NotificationChannel`].

mod service;

pub use service::NotificationService;

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::monitor::MonitorEvent;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> &'static str;

    async fn send(&self, event: &MonitorEvent) -> Result<()>;
}

/// Writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &MonitorEvent) -> Result<()> {
        info!(
            event_type = event.event_type(),
            creator_id = event.creator_id(),
            platform = %event.platform(),
            session_id = event.session_id(),
            "{}",
            event.description()
        );
        Ok(())
    }
}
