//! Two-phase detection that guards a metered API behind a free probe.
//!
//! Phase 1 asks an [`UnmeteredProbe`] whether the account is possibly live.
//! A negative probe is final and costs nothing. A positive probe is never
//! trusted on its own: it escalates to exactly one [`MeteredLookup`] call,
//! whose answer is authoritative.
//!
//! When the metered API reports exhausted quota the resolver enters a backoff
//! window. During backoff positive probes surface as `rate_limited` so the
//! caller treats the poll as unknown instead of guessing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use super::error::DetectError;
use crate::media::{DetectionResult, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Offline,
    PossiblyLive,
}

#[async_trait]
pub trait UnmeteredProbe: Send + Sync {
    async fn probe(&self, account_ref: &str) -> Result<ProbeVerdict, DetectError>;
}

#[async_trait]
pub trait MeteredLookup: Send + Sync {
    async fn lookup(&self, account_ref: &str) -> Result<DetectionResult, DetectError>;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a probe verdict is reused.
    pub probe_ttl: Duration,
    /// How long a confirmed-live metered answer is reused.
    pub live_ttl: Duration,
    /// Metered calls are suspended this long after a quota rejection.
    pub quota_backoff: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_ttl: Duration::from_secs(60),
            live_ttl: Duration::from_secs(300),
            quota_backoff: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Default)]
struct ResolverState {
    backoff_until: Option<Instant>,
    probes: FxHashMap<String, (Instant, ProbeVerdict)>,
    live: FxHashMap<String, (Instant, DetectionResult)>,
}

pub struct QuotaAwareResolver {
    platform: Platform,
    probe: Arc<dyn UnmeteredProbe>,
    metered: Arc<dyn MeteredLookup>,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
}

impl QuotaAwareResolver {
    pub fn new(
        platform: Platform,
        probe: Arc<dyn UnmeteredProbe>,
        metered: Arc<dyn MeteredLookup>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            platform,
            probe,
            metered,
            config,
            state: Mutex::new(ResolverState::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Remaining quota backoff, if any.
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        match state.backoff_until {
            Some(until) => {
                let now = Instant::now();
                if until > now {
                    Some(until - now)
                } else {
                    state.backoff_until = None;
                    None
                }
            }
            None => None,
        }
    }

    pub async fn resolve(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
        let verdict = self.probe_cached(account_ref).await?;

        if verdict == ProbeVerdict::Offline {
            self.state.lock().live.remove(account_ref);
            debug!(platform = %self.platform, account = account_ref, "Probe negative, skipping metered lookup");
            return Ok(DetectionResult::offline(self.platform, account_ref));
        }

        if let Some(cached) = self.cached_live(account_ref) {
            debug!(platform = %self.platform, account = account_ref, "Using cached metered result");
            return Ok(cached);
        }

        if let Some(remaining) = self.backoff_remaining() {
            info!(
                platform = %self.platform,
                account = account_ref,
                remaining_secs = remaining.as_secs(),
                "Probe positive but metered API is in quota backoff"
            );
            return Err(DetectError::RateLimited {
                retry_after: Some(remaining),
            });
        }

        match self.metered.lookup(account_ref).await {
            Ok(result) => {
                let mut state = self.state.lock();
                if result.is_live {
                    state
                        .live
                        .insert(account_ref.to_string(), (Instant::now(), result.clone()));
                } else {
                    state.live.remove(account_ref);
                }
                Ok(result)
            }
            Err(e) if e.is_quota_exhausted() => {
                warn!(
                    platform = %self.platform,
                    backoff_secs = self.config.quota_backoff.as_secs(),
                    "Metered API quota exhausted, entering backoff"
                );
                self.state.lock().backoff_until = Some(Instant::now() + self.config.quota_backoff);
                Err(DetectError::RateLimited {
                    retry_after: Some(self.config.quota_backoff),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn probe_cached(&self, account_ref: &str) -> Result<ProbeVerdict, DetectError> {
        {
            let state = self.state.lock();
            if let Some((at, verdict)) = state.probes.get(account_ref)
                && at.elapsed() < self.config.probe_ttl
            {
                return Ok(*verdict);
            }
        }

        let verdict = self.probe.probe(account_ref).await?;
        self.state
            .lock()
            .probes
            .insert(account_ref.to_string(), (Instant::now(), verdict));
        Ok(verdict)
    }

    fn cached_live(&self, account_ref: &str) -> Option<DetectionResult> {
        let mut state = self.state.lock();
        match state.live.get(account_ref) {
            Some((at, result)) if at.elapsed() < self.config.live_ttl => Some(result.clone()),
            Some(_) => {
                state.live.remove(account_ref);
                None
            }
            None => None,
        }
    }
}
