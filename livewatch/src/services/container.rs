//! Service container.
//!
//! Builds every service from an [`AppConfig`] and owns their lifecycle:
//! `initialize` starts background work, `shutdown` cancels it and waits.

use std::sync::Arc;
use std::time::Duration;

use live_platforms::{DetectorRegistry, default_client, default_registry};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::Result;
use crate::config::AppConfig;
use crate::credentials::CredentialRefreshService;
use crate::database::repositories::{
    BindingSource, LiveStatusStore, SqlxBindingSource, SqlxLiveStatusStore, SqlxStreakRepository,
};
use crate::database::{self, DbPool};
use crate::monitor::{MonitorEvent, StreamMonitor};
use crate::notification::{LogChannel, NotificationService};
use crate::scheduler::TieredScheduler;
use crate::streak::StreakAccumulator;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ServiceContainer {
    pub pool: DbPool,
    pub registry: DetectorRegistry,
    pub monitor: Arc<StreamMonitor>,
    pub scheduler: Arc<TieredScheduler>,
    pub credentials: Arc<CredentialRefreshService>,
    pub notifications: Arc<NotificationService>,
    pub streaks: Arc<StreakAccumulator>,
    cancellation_token: CancellationToken,
    /// Cancels only the scheduler, so its last polls can be published before consumers stop.
    scheduler_token: CancellationToken,
    scheduler_tasks: TaskTracker,
    tasks: TaskTracker,
}

impl ServiceContainer {
    /// Open the database, run migrations and build the detector registry.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let client = default_client()?;
        let registry = default_registry(client, &config.detector_settings());
        info!(
            platforms = ?registry.platforms().collect::<Vec<_>>(),
            "Detectors registered"
        );

        Ok(Self::new(pool, registry, config))
    }

    /// Wire services over an existing pool and registry.
    pub fn new(pool: DbPool, registry: DetectorRegistry, config: &AppConfig) -> Self {
        let cancellation_token = CancellationToken::new();
        let scheduler_token = cancellation_token.child_token();

        let store: Arc<dyn LiveStatusStore> = Arc::new(SqlxLiveStatusStore::new(pool.clone()));
        let monitor = Arc::new(StreamMonitor::new(store, config.monitor.clone()));
        let credentials = Arc::new(CredentialRefreshService::new(registry.clone()));

        let source: Arc<dyn BindingSource> = Arc::new(SqlxBindingSource::new(pool.clone()));
        let scheduler = Arc::new(TieredScheduler::new(
            source,
            registry.clone(),
            monitor.clone(),
            credentials.clone(),
            config.scheduler.clone(),
            scheduler_token.clone(),
        ));

        let notifications = Arc::new(NotificationService::new(
            vec![Arc::new(LogChannel)],
            cancellation_token.child_token(),
        ));
        let streaks = Arc::new(StreakAccumulator::new(Arc::new(SqlxStreakRepository::new(
            pool.clone(),
        ))));

        Self {
            pool,
            registry,
            monitor,
            scheduler,
            credentials,
            notifications,
            streaks,
            cancellation_token,
            scheduler_token,
            scheduler_tasks: TaskTracker::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Start consumers first so no event published at startup is missed.
    pub fn initialize(&self) {
        self.notifications.listen(self.monitor.subscribe());

        let streaks = self.streaks.clone();
        let rx = self.monitor.subscribe();
        let cancel = self.cancellation_token.child_token();
        self.tasks.spawn(async move { streaks.run(rx, cancel).await });

        self.monitor.start();

        let scheduler = self.scheduler.clone();
        self.scheduler_tasks
            .spawn(async move { scheduler.run().await });

        info!("Services initialized");
    }

    pub fn subscribe_monitor_events(&self) -> tokio::sync::broadcast::Receiver<MonitorEvent> {
        self.monitor.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop polling, publish what the last polls committed, then stop consumers.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!("Shutting down services (timeout: {:?})", timeout);

        let drained = tokio::time::timeout(timeout, async {
            self.scheduler_token.cancel();
            self.scheduler_tasks.close();
            self.scheduler_tasks.wait().await;
            self.monitor.flush_outbox().await
        })
        .await;

        match drained {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Final outbox flush failed: {}", e),
            Err(_) => warn!("Shutdown timeout reached, forcing shutdown"),
        }

        self.cancellation_token.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.credentials.shutdown().await;
        self.notifications.shutdown().await;
        self.monitor.stop().await;

        self.pool.close().await;
        info!("Services shut down");
    }
}
