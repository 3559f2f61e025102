//! Two independent polling loops, one per tier.
//!
//! Each tick reads a fresh roster snapshot and dispatches one task per
//! binding. A binding whose previous poll has not finished is skipped for that
//! tick. Adapter calls are bounded per platform by a semaphore, and the wait for
//! a permit counts against the poll timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use live_platforms::{DetectError, DetectorRegistry, ErrorKind, Platform};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::SchedulerConfig;
use crate::credentials::CredentialRefreshService;
use crate::database::repositories::BindingSource;
use crate::domain::{Binding, BindingKey, PollOutcome, Tier, UnknownReason};
use crate::monitor::StreamMonitor;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    /// Bindings whose previous poll was still in flight.
    pub skipped: usize,
}

/// Shared by the scheduler and every poll task it spawns.
struct PollContext {
    registry: DetectorRegistry,
    monitor: Arc<StreamMonitor>,
    credentials: Arc<CredentialRefreshService>,
    semaphores: HashMap<Platform, Arc<Semaphore>>,
    poll_timeout: Duration,
    in_flight: DashSet<BindingKey>,
}

/// Clears the in-flight mark when the poll task ends, however it ends.
struct InFlightGuard {
    ctx: Arc<PollContext>,
    key: BindingKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ctx.in_flight.remove(&self.key);
    }
}

pub struct TieredScheduler {
    source: Arc<dyn BindingSource>,
    ctx: Arc<PollContext>,
    config: SchedulerConfig,
    tasks: TaskTracker,
    cancellation: CancellationToken,
}

impl TieredScheduler {
    pub fn new(
        source: Arc<dyn BindingSource>,
        registry: DetectorRegistry,
        monitor: Arc<StreamMonitor>,
        credentials: Arc<CredentialRefreshService>,
        config: SchedulerConfig,
        cancellation: CancellationToken,
    ) -> Self {
        let semaphores = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(Semaphore::new(config.concurrency_for(p).max(1)))))
            .collect();

        Self {
            source,
            ctx: Arc::new(PollContext {
                registry,
                monitor,
                credentials,
                semaphores,
                poll_timeout: config.poll_timeout,
                in_flight: DashSet::new(),
            }),
            config,
            tasks: TaskTracker::new(),
            cancellation,
        }
    }

    /// Run both tier loops until cancelled, then wait for in-flight polls.
    pub async fn run(&self) {
        info!(
            base_interval_secs = self.config.base_interval.as_secs(),
            slow_interval_secs = self.config.slow_interval().as_secs(),
            "Scheduler started"
        );

        tokio::join!(
            self.tier_loop(Tier::Karma, self.config.base_interval),
            self.tier_loop(Tier::Regular, self.config.slow_interval()),
        );

        self.tasks.close();
        self.tasks.wait().await;
        info!("Scheduler stopped");
    }

    async fn tier_loop(&self, tier: Tier, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick(tier).await {
                Ok(report) if report.skipped > 0 => {
                    info!(%tier, dispatched = report.dispatched, skipped = report.skipped, "Tick dispatched with skips");
                }
                Ok(report) => debug!(%tier, dispatched = report.dispatched, "Tick dispatched"),
                Err(e) => warn!(%tier, error = %e, "Failed to load bindings, skipping tick"),
            }
        }
        debug!(%tier, "Tier loop stopped");
    }

    /// Dispatch one poll per binding of `tier`. Does not wait for the polls.
    pub async fn tick(&self, tier: Tier) -> Result<TickReport> {
        let bindings = self.source.load_active().await?;
        let mut report = TickReport::default();

        for binding in bindings.into_iter().filter(|b| b.tier == tier) {
            let key = binding.key();
            if !self.ctx.in_flight.insert(key.clone()) {
                debug!(binding = %key, "Previous poll still in flight, skipping");
                report.skipped += 1;
                continue;
            }

            let guard = InFlightGuard {
                ctx: Arc::clone(&self.ctx),
                key,
            };
            let ctx = Arc::clone(&self.ctx);
            let cancellation = self.cancellation.clone();
            self.tasks.spawn(async move {
                let _guard = guard;
                poll_binding(&ctx, binding, &cancellation).await;
            });
            report.dispatched += 1;
        }

        Ok(report)
    }

    /// Wait until every dispatched poll has finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight.len()
    }
}

async fn poll_binding(ctx: &PollContext, binding: Binding, cancellation: &CancellationToken) {
    let key = binding.key();

    // A poll interrupted by shutdown applies nothing.
    let outcome = tokio::select! {
        biased;
        _ = cancellation.cancelled() => {
            debug!(binding = %key, "Poll cancelled");
            return;
        }
        outcome = detect(ctx, &binding) => outcome,
    };

    if let PollOutcome::Unknown {
        reason: UnknownReason::Detect(ErrorKind::AuthExpired),
        ..
    } = &outcome
    {
        ctx.credentials.signal(binding.platform);
    }

    if let Err(e) = ctx.monitor.apply(&key, outcome).await {
        warn!(binding = %key, error = %e, "Failed to persist poll outcome");
    }
}

enum PollError {
    Detect(DetectError),
    Closed,
}

async fn detect(ctx: &PollContext, binding: &Binding) -> PollOutcome {
    let key = binding.key();
    let Some(detector) = ctx.registry.get(binding.platform) else {
        warn!(binding = %key, "No detector configured for platform");
        return PollOutcome::unknown(UnknownReason::NoDetector);
    };
    let Some(semaphore) = ctx.semaphores.get(&binding.platform).cloned() else {
        return PollOutcome::unknown(UnknownReason::NoDetector);
    };

    let attempt = async {
        let _permit = semaphore.acquire_owned().await.map_err(|_| PollError::Closed)?;
        detector
            .detect(&binding.account_ref)
            .await
            .map_err(PollError::Detect)
    };

    match tokio::time::timeout(ctx.poll_timeout, attempt).await {
        Ok(Ok(result)) => PollOutcome::Detected(result),
        Ok(Err(PollError::Detect(e))) => {
            let kind = e.kind();
            match kind {
                ErrorKind::NotFound | ErrorKind::MalformedResponse => {
                    warn!(binding = %key, account = %binding.account_ref, error = %e, "Detection failed, check binding configuration");
                }
                ErrorKind::AuthExpired => {
                    warn!(binding = %key, error = %e, "Platform credentials rejected");
                }
                ErrorKind::RateLimited => info!(binding = %key, error = %e, "Detection rate limited"),
                ErrorKind::TransientNetwork => debug!(binding = %key, error = %e, "Transient detection failure"),
            }
            PollOutcome::unknown(UnknownReason::Detect(kind))
        }
        // Semaphores are never closed while the scheduler exists.
        Ok(Err(PollError::Closed)) => PollOutcome::unknown(UnknownReason::Timeout),
        Err(_) => {
            warn!(binding = %key, timeout_secs = ctx.poll_timeout.as_secs(), "Poll timed out");
            PollOutcome::unknown(UnknownReason::Timeout)
        }
    }
}
