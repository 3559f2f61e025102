//! Credential refresh triggered by `auth_expired` detections.
//!
//! Many polls of one platform can fail with `auth_expired` in the same tick.
//! Only the first signal starts a refresh; the rest are dropped while it runs
//! and for `min_interval` after a successful one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use live_platforms::{DetectError, DetectorRegistry, Platform};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh for the platform was already running.
    InProgress,
    /// The last successful refresh is too recent.
    Throttled,
    NoDetector,
}

pub struct CredentialRefreshService {
    registry: DetectorRegistry,
    in_progress: DashSet<Platform>,
    last_success: DashMap<Platform, Instant>,
    min_interval: Duration,
    tasks: TaskTracker,
}

/// Removes the platform from the in-progress set on every exit path.
struct InProgressGuard<'a> {
    set: &'a DashSet<Platform>,
    platform: Platform,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.platform);
    }
}

impl CredentialRefreshService {
    pub fn new(registry: DetectorRegistry) -> Self {
        Self::with_min_interval(registry, DEFAULT_MIN_INTERVAL)
    }

    pub fn with_min_interval(registry: DetectorRegistry, min_interval: Duration) -> Self {
        Self {
            registry,
            in_progress: DashSet::new(),
            last_success: DashMap::new(),
            min_interval,
            tasks: TaskTracker::new(),
        }
    }

    /// Fire-and-forget refresh request.
    pub fn signal(self: &Arc<Self>, platform: Platform) {
        if self.in_progress.contains(&platform) {
            debug!(%platform, "Credential refresh already running");
            return;
        }
        let this = Arc::clone(self);
        self.tasks.spawn(async move {
            if let Err(e) = this.refresh(platform).await {
                warn!(%platform, error = %e, "Credential refresh failed");
            }
        });
    }

    /// Refresh now unless a refresh is running or ran recently.
    pub async fn refresh(&self, platform: Platform) -> Result<RefreshOutcome, DetectError> {
        let Some(detector) = self.registry.get(platform) else {
            return Ok(RefreshOutcome::NoDetector);
        };

        if let Some(at) = self.last_success.get(&platform).map(|at| *at)
            && at.elapsed() < self.min_interval
        {
            return Ok(RefreshOutcome::Throttled);
        }

        if !self.in_progress.insert(platform) {
            return Ok(RefreshOutcome::InProgress);
        }
        let _guard = InProgressGuard {
            set: &self.in_progress,
            platform,
        };

        info!(%platform, "Refreshing platform credentials");
        detector.refresh_credentials().await?;
        self.last_success.insert(platform, Instant::now());
        Ok(RefreshOutcome::Refreshed)
    }

    /// Wait for spawned refreshes to finish.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use live_platforms::{DetectionResult, PlatformDetector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowRefresh {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl PlatformDetector for SlowRefresh {
        fn platform(&self) -> Platform {
            Platform::Twitch
        }

        async fn detect(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
            Ok(DetectionResult::offline(Platform::Twitch, account_ref))
        }

        async fn refresh_credentials(&self) -> Result<(), DetectError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    }

    fn service(min_interval: Duration) -> (Arc<CredentialRefreshService>, Arc<SlowRefresh>) {
        let detector = Arc::new(SlowRefresh {
            refreshes: AtomicUsize::new(0),
        });
        let registry = DetectorRegistry::new().with(detector.clone());
        (
            Arc::new(CredentialRefreshService::with_min_interval(registry, min_interval)),
            detector,
        )
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_are_deduplicated() {
        let (service, detector) = service(Duration::ZERO);
        let (a, b) = tokio::join!(
            service.refresh(Platform::Twitch),
            service.refresh(Platform::Twitch)
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o == RefreshOutcome::Refreshed);
        assert_eq!(outcomes, vec![RefreshOutcome::InProgress, RefreshOutcome::Refreshed]);
        assert_eq!(detector.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recent_refresh_is_throttled() {
        let (service, detector) = service(Duration::from_secs(60));
        assert_eq!(service.refresh(Platform::Twitch).await.unwrap(), RefreshOutcome::Refreshed);
        assert_eq!(service.refresh(Platform::Twitch).await.unwrap(), RefreshOutcome::Throttled);
        assert_eq!(detector.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signals_collapse() {
        let (service, detector) = service(Duration::from_secs(60));
        for _ in 0..10 {
            service.signal(Platform::Twitch);
        }
        service.signal(Platform::YouTube);
        service.shutdown().await;
        assert_eq!(detector.refreshes.load(Ordering::SeqCst), 1);
    }
}
