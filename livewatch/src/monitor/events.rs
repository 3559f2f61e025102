//! Session events emitted by the stream monitor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use live_platforms::Platform;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpenEvent {
    pub creator_id: String,
    pub platform: Platform,
    pub session_id: String,
    pub viewer_count: Option<u64>,
    pub title: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCloseEvent {
    pub creator_id: String,
    pub platform: Platform,
    pub session_id: String,
    pub opened_at: DateTime<Utc>,
    /// Start of the segment this close ends.
    pub resumed_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Live time of the segment, `closed_at - resumed_at`.
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonitorEvent {
    SessionOpened(SessionOpenEvent),
    SessionClosed(SessionCloseEvent),
}

impl MonitorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionOpened(_) => "SessionOpened",
            Self::SessionClosed(_) => "SessionClosed",
        }
    }

    pub fn creator_id(&self) -> &str {
        match self {
            Self::SessionOpened(e) => &e.creator_id,
            Self::SessionClosed(e) => &e.creator_id,
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::SessionOpened(e) => e.platform,
            Self::SessionClosed(e) => e.platform,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionOpened(e) => &e.session_id,
            Self::SessionClosed(e) => &e.session_id,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::SessionOpened(e) => format!(
                "{} is live on {}: {}",
                e.creator_id,
                e.platform,
                e.title.as_deref().unwrap_or("(untitled)")
            ),
            Self::SessionClosed(e) => format!(
                "{} went offline on {} after {} min",
                e.creator_id,
                e.platform,
                e.duration.as_secs() / 60
            ),
        }
    }
}

/// Fan-out of monitor events to in-process consumers.
#[derive(Clone)]
pub struct MonitorEventBroadcaster {
    sender: broadcast::Sender<MonitorEvent>,
}

impl MonitorEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Returns the receiver count, or the event back if nobody is listening.
    pub fn publish(
        &self,
        event: MonitorEvent,
    ) -> Result<usize, broadcast::error::SendError<MonitorEvent>> {
        self.sender.send(event)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MonitorEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
