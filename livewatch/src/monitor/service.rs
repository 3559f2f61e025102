//! Stream monitor service.
//!
//! Each binding has its own async lock, so read-modify-write of one binding is
//! exclusive while different bindings proceed in parallel. State is committed
//! to the store before the in-memory copy is replaced; a failed or cancelled
//! commit leaves both untouched.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::events::{MonitorEvent, MonitorEventBroadcaster};
use super::state_machine::{Step, StreamStateMachine};
use crate::Result;
use crate::config::MonitorConfig;
use crate::database::repositories::LiveStatusStore;
use crate::database::time::now_ms;
use crate::domain::{BindingKey, BindingState, BindingStatus, PollOutcome, StreamSession};

const OUTBOX_BATCH_SIZE: usize = 100;
const OUTBOX_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

type Slot = Arc<Mutex<Option<BindingState>>>;

pub struct StreamMonitor {
    store: Arc<dyn LiveStatusStore>,
    machine: StreamStateMachine,
    /// Cached state per binding. `None` until first loaded from the store.
    slots: DashMap<BindingKey, Slot>,
    broadcaster: MonitorEventBroadcaster,
    outbox_notify: Arc<Notify>,
    cancellation: CancellationToken,
    tasks: TaskTracker,
    config: MonitorConfig,
}

impl StreamMonitor {
    pub fn new(store: Arc<dyn LiveStatusStore>, config: MonitorConfig) -> Self {
        Self::with_broadcaster(store, config, MonitorEventBroadcaster::new())
    }

    pub fn with_broadcaster(
        store: Arc<dyn LiveStatusStore>,
        config: MonitorConfig,
        broadcaster: MonitorEventBroadcaster,
    ) -> Self {
        Self {
            store,
            machine: StreamStateMachine::new(config.offline_threshold),
            slots: DashMap::new(),
            broadcaster,
            outbox_notify: Arc::new(Notify::new()),
            cancellation: CancellationToken::new(),
            tasks: TaskTracker::new(),
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.broadcaster.subscribe()
    }

    /// Spawn the outbox publisher and the periodic prune of delivered rows.
    pub fn start(&self) {
        self.spawn_outbox_publisher();
        self.spawn_outbox_pruner();
        // Deliver whatever a previous run left behind.
        self.outbox_notify.notify_one();
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn stop(&self) {
        info!("Stopping stream monitor");
        self.cancellation.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn slot(&self, key: &BindingKey) -> Slot {
        self.slots.entry(key.clone()).or_default().clone()
    }

    /// Apply one poll outcome to a binding.
    ///
    /// Persistence errors are returned and leave the cached state as it was,
    /// so the next poll retries from the last committed state.
    pub async fn apply(&self, key: &BindingKey, outcome: PollOutcome) -> Result<Step> {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        let current = match guard.as_ref() {
            Some(state) => state.clone(),
            None => {
                let loaded = self.store.load(key).await?.unwrap_or_default();
                *guard = Some(loaded.clone());
                loaded
            }
        };

        let step = self.machine.apply(key, &current, &outcome);
        match &step {
            Step::Stale {
                fetched_at,
                last_fetched_at,
            } => {
                debug!(
                    binding = %key,
                    %fetched_at,
                    %last_fetched_at,
                    "Dropping stale detection result"
                );
            }
            Step::Applied(transition) => {
                self.store.commit(key, transition).await?;
                *guard = Some(transition.state.clone());

                for event in &transition.events {
                    info!(binding = %key, session_id = event.session_id(), "{}", event.description());
                }
                if !transition.events.is_empty() {
                    self.outbox_notify.notify_one();
                }
            }
        }
        Ok(step)
    }

    /// Current status of a binding, including "could not verify" runs.
    pub async fn status(&self, key: &BindingKey) -> Result<BindingStatus> {
        Ok(self.state(key).await?.status())
    }

    pub async fn state(&self, key: &BindingKey) -> Result<BindingState> {
        if let Some(slot) = self.slots.get(key).map(|s| s.clone()) {
            let guard = slot.lock().await;
            if let Some(state) = guard.as_ref() {
                return Ok(state.clone());
            }
        }
        Ok(self.store.load(key).await?.unwrap_or_default())
    }

    /// Session history of a binding, newest first.
    pub async fn sessions(&self, key: &BindingKey, limit: usize) -> Result<Vec<StreamSession>> {
        self.store.sessions(key, limit).await
    }

    /// Publish pending outbox events once. Returns how many were delivered.
    pub async fn flush_outbox(&self) -> Result<usize> {
        flush_outbox_once(self.store.as_ref(), &self.broadcaster).await
    }

    fn spawn_outbox_publisher(&self) {
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        let notify = self.outbox_notify.clone();
        let cancellation = self.cancellation.clone();
        let poll_interval = self.config.outbox_poll_interval;

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        info!("Outbox publisher shutting down");
                        break;
                    }
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }

                if let Err(e) = flush_outbox_once(store.as_ref(), &broadcaster).await {
                    warn!("Monitor outbox flush failed: {}", e);
                }
            }
            debug!("Outbox publisher stopped");
        });
    }

    fn spawn_outbox_pruner(&self) {
        let store = self.store.clone();
        let cancellation = self.cancellation.clone();
        let retention = self.config.outbox_retention;

        self.tasks.spawn(async move {
            let mut interval = tokio::time::interval(OUTBOX_PRUNE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
                let cutoff = now_ms().saturating_sub(retention_ms);
                match store.prune_delivered_before(cutoff).await {
                    Ok(0) => {}
                    Ok(n) => debug!(deleted = n, "Pruned delivered outbox events"),
                    Err(e) => warn!("Outbox prune failed: {}", e),
                }
            }
        });
    }
}

async fn flush_outbox_once(
    store: &dyn LiveStatusStore,
    broadcaster: &MonitorEventBroadcaster,
) -> Result<usize> {
    let entries = store.fetch_undelivered(OUTBOX_BATCH_SIZE).await?;
    let mut delivered = 0;

    for entry in entries {
        match serde_json::from_str::<MonitorEvent>(&entry.payload) {
            Ok(event) => {
                match broadcaster.publish(event) {
                    Ok(receivers) => debug!(id = entry.id, receivers, "Published monitor event"),
                    // Nobody listening is not retryable; the row would never drain.
                    Err(e) => warn!(
                        "Monitor outbox event id={} has no receivers, discarding: {}",
                        entry.id,
                        e.0.event_type()
                    ),
                }
                store.mark_delivered(entry.id).await?;
                delivered += 1;
            }
            Err(e) => {
                warn!("Invalid monitor outbox payload id={}: {}", entry.id, e);
                store.record_failure(entry.id, &e.to_string()).await?;
            }
        }
    }

    Ok(delivered)
}
