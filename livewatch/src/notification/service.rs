use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::monitor::MonitorEvent;

/// Fans monitor events out to every registered channel.
pub struct NotificationService {
    channels: Vec<Arc<dyn NotificationChannel>>,
    cancellation: CancellationToken,
    tasks: TaskTracker,
}

impl NotificationService {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, cancellation: CancellationToken) -> Self {
        Self {
            channels,
            cancellation,
            tasks: TaskTracker::new(),
        }
    }

    /// Send one event to every channel. A failing channel does not stop the others.
    pub async fn dispatch(&self, event: &MonitorEvent) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = channel.channel_type(),
                    session_id = event.session_id(),
                    "Failed to dispatch notification: {}",
                    e
                ),
            }
        }
        delivered
    }

    /// Consume `rx` in the background until cancelled or the sender is gone.
    pub fn listen(self: &Arc<Self>, mut rx: broadcast::Receiver<MonitorEvent>) {
        let service = Arc::clone(self);
        let cancellation = self.cancellation.clone();

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            service.dispatch(&event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Notification listener lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Monitor event channel closed");
                            break;
                        }
                    }
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{MonitorEventBroadcaster, SessionOpenEvent};
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use live_platforms::Platform;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        sessions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn channel_type(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, event: &MonitorEvent) -> Result<()> {
            self.sessions.lock().push(event.session_id().to_string());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        fn channel_type(&self) -> &'static str {
            "broken"
        }

        async fn send(&self, _event: &MonitorEvent) -> Result<()> {
            Err(Error::Other("unreachable".into()))
        }
    }

    fn opened(session_id: &str) -> MonitorEvent {
        MonitorEvent::SessionOpened(SessionOpenEvent {
            creator_id: "c1".into(),
            platform: Platform::YouTube,
            session_id: session_id.into(),
            viewer_count: None,
            title: None,
            started_at: None,
            opened_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let recording = Arc::new(Recording::default());
        let service = NotificationService::new(
            vec![Arc::new(Broken), recording.clone()],
            CancellationToken::new(),
        );
        assert_eq!(service.dispatch(&opened("youtube:a")).await, 1);
        assert_eq!(*recording.sessions.lock(), vec!["youtube:a".to_string()]);
    }

    #[tokio::test]
    async fn test_listener_drains_until_sender_dropped() {
        let recording = Arc::new(Recording::default());
        let service = Arc::new(NotificationService::new(
            vec![recording.clone()],
            CancellationToken::new(),
        ));
        let broadcaster = MonitorEventBroadcaster::new();
        service.listen(broadcaster.subscribe());

        broadcaster.publish(opened("youtube:a")).unwrap();
        broadcaster.publish(opened("youtube:b")).unwrap();
        drop(broadcaster);
        service.shutdown().await;

        assert_eq!(recording.sessions.lock().len(), 2);
    }
}
