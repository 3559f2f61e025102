//! Process configuration read from the environment.
//!
//! `.env` files are honoured through `dotenvy`. Every knob has a default so a
//! bare `livewatch` invocation starts against a local SQLite file.

use std::str::FromStr;
use std::time::Duration;

use live_platforms::{DetectorSettings, Platform, ResolverConfig};

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:livewatch.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the fast (karma) tier.
    pub base_interval: Duration,
    /// Slow (regular) tier runs every `base_interval * slow_tier_multiplier`.
    pub slow_tier_multiplier: u32,
    /// Upper bound on one poll, including the wait for a concurrency permit.
    pub poll_timeout: Duration,
    pub twitch_concurrency: usize,
    pub youtube_concurrency: usize,
    pub tiktok_concurrency: usize,
}

impl SchedulerConfig {
    pub fn slow_interval(&self) -> Duration {
        self.base_interval * self.slow_tier_multiplier
    }

    pub fn concurrency_for(&self, platform: Platform) -> usize {
        match platform {
            Platform::Twitch => self.twitch_concurrency,
            Platform::YouTube => self.youtube_concurrency,
            Platform::TikTok => self.tiktok_concurrency,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            slow_tier_multiplier: 3,
            poll_timeout: Duration::from_secs(20),
            twitch_concurrency: 8,
            youtube_concurrency: 4,
            tiktok_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Consecutive confirmed-offline polls needed to close a session.
    pub offline_threshold: u32,
    /// Delivered outbox rows older than this are pruned.
    pub outbox_retention: Duration,
    /// How often the outbox publisher wakes up when not notified.
    pub outbox_poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            offline_threshold: 2,
            outbox_retention: Duration::from_secs(24 * 3600),
            outbox_poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorConfig,
    pub classifier_threshold: usize,
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    pub youtube_api_key: Option<String>,
    pub youtube_quota_backoff: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            scheduler: SchedulerConfig::default(),
            monitor: MonitorConfig::default(),
            classifier_threshold: 2,
            twitch_client_id: None,
            twitch_client_secret: None,
            youtube_api_key: None,
            youtube_quota_backoff: Duration::from_secs(30 * 60),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and then read the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(Error::config(format!("failed to read .env: {e}")));
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = dir;
        }

        let scheduler = &mut config.scheduler;
        if let Some(secs) = parse::<u64>(&get, "POLL_BASE_INTERVAL_SECS")? {
            scheduler.base_interval = Duration::from_secs(secs);
        }
        if let Some(m) = parse(&get, "SLOW_TIER_MULTIPLIER")? {
            scheduler.slow_tier_multiplier = m;
        }
        if let Some(secs) = parse::<u64>(&get, "POLL_TIMEOUT_SECS")? {
            scheduler.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&get, "PLATFORM_CONCURRENCY_TWITCH")? {
            scheduler.twitch_concurrency = n;
        }
        if let Some(n) = parse(&get, "PLATFORM_CONCURRENCY_YOUTUBE")? {
            scheduler.youtube_concurrency = n;
        }
        if let Some(n) = parse(&get, "PLATFORM_CONCURRENCY_TIKTOK")? {
            scheduler.tiktok_concurrency = n;
        }

        if let Some(n) = parse(&get, "OFFLINE_DEBOUNCE_THRESHOLD")? {
            config.monitor.offline_threshold = n;
        }
        if let Some(hours) = parse::<u64>(&get, "OUTBOX_RETENTION_HOURS")? {
            config.monitor.outbox_retention = Duration::from_secs(hours * 3600);
        }
        if let Some(n) = parse(&get, "CLASSIFIER_THRESHOLD")? {
            config.classifier_threshold = n;
        }

        config.twitch_client_id = get("TWITCH_CLIENT_ID");
        config.twitch_client_secret = get("TWITCH_CLIENT_SECRET");
        config.youtube_api_key = get("YOUTUBE_API_KEY");
        if let Some(secs) = parse::<u64>(&get, "YOUTUBE_QUOTA_BACKOFF_SECS")? {
            config.youtube_quota_backoff = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.base_interval.is_zero() {
            return Err(Error::validation("POLL_BASE_INTERVAL_SECS must be > 0"));
        }
        if s.slow_tier_multiplier == 0 {
            return Err(Error::validation("SLOW_TIER_MULTIPLIER must be >= 1"));
        }
        if s.poll_timeout.is_zero() {
            return Err(Error::validation("POLL_TIMEOUT_SECS must be > 0"));
        }
        if Platform::ALL.iter().any(|p| s.concurrency_for(*p) == 0) {
            return Err(Error::validation("PLATFORM_CONCURRENCY_* must be >= 1"));
        }
        if self.monitor.offline_threshold == 0 {
            return Err(Error::validation("OFFLINE_DEBOUNCE_THRESHOLD must be >= 1"));
        }
        if self.classifier_threshold == 0 {
            return Err(Error::validation("CLASSIFIER_THRESHOLD must be >= 1"));
        }
        if self.twitch_client_id.is_some() != self.twitch_client_secret.is_some() {
            return Err(Error::validation(
                "TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set together",
            ));
        }
        Ok(())
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            twitch_client_id: self.twitch_client_id.clone(),
            twitch_client_secret: self.twitch_client_secret.clone(),
            youtube_api_key: self.youtube_api_key.clone(),
            classifier_threshold: self.classifier_threshold,
            resolver: ResolverConfig {
                quota_backoff: self.youtube_quota_backoff,
                ..ResolverConfig::default()
            },
        }
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(format!("{key}='{raw}': {e}")))
        })
        .transpose()
}
