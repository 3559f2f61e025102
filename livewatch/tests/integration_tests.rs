//! End-to-end tests over a real SQLite database: bindings in, sessions and
//! events out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use live_platforms::{DetectError, DetectionResult, DetectorRegistry, Platform, PlatformDetector};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use livewatch::config::{MonitorConfig, SchedulerConfig};
use livewatch::credentials::CredentialRefreshService;
use livewatch::database::repositories::{
    LiveStatusStore, MemoryStreakRepository, SqlxBindingSource, SqlxLiveStatusStore,
};
use livewatch::database::{DbPool, init_pool_with_size, run_migrations};
use livewatch::domain::{Binding, BindingKey, BindingStatus, PollOutcome, Tier};
use livewatch::monitor::{MonitorEvent, StreamMonitor};
use livewatch::scheduler::TieredScheduler;
use livewatch::streak::StreakAccumulator;

async fn setup_test_db() -> (DbPool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("livewatch.db").display());
    let pool = init_pool_with_size(&url, 4)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    (pool, dir)
}

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

type Scripted = std::result::Result<DetectionResult, DetectError>;

/// Replays a fixed script of answers, one per call. An empty script answers offline.
struct ScriptedDetector {
    platform: Platform,
    script: Mutex<VecDeque<Scripted>>,
}

impl ScriptedDetector {
    fn new(platform: Platform, script: Vec<Scripted>) -> Self {
        Self {
            platform,
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl PlatformDetector for ScriptedDetector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn detect(&self, account_ref: &str) -> Scripted {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DetectionResult::offline(self.platform, account_ref)))
    }
}

struct Harness {
    scheduler: TieredScheduler,
    monitor: Arc<StreamMonitor>,
    _dir: TempDir,
}

async fn harness(detector: ScriptedDetector, bindings: &[Binding]) -> Harness {
    let (pool, dir) = setup_test_db().await;

    let source = SqlxBindingSource::new(pool.clone());
    for binding in bindings {
        source.upsert(binding, true).await.unwrap();
    }

    let registry = DetectorRegistry::new().with(Arc::new(detector));
    let store: Arc<dyn LiveStatusStore> = Arc::new(SqlxLiveStatusStore::new(pool));
    let monitor = Arc::new(StreamMonitor::new(store, MonitorConfig::default()));
    let scheduler = TieredScheduler::new(
        Arc::new(source),
        registry.clone(),
        monitor.clone(),
        Arc::new(CredentialRefreshService::new(registry)),
        SchedulerConfig::default(),
        CancellationToken::new(),
    );

    Harness {
        scheduler,
        monitor,
        _dir: dir,
    }
}

impl Harness {
    async fn tick(&self) {
        self.scheduler.tick(Tier::Karma).await.unwrap();
        self.scheduler.wait_idle().await;
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_session_lifecycle_through_scheduler() {
    let script = vec![
        Ok(DetectionResult::live_at(Platform::Twitch, "streamer", t(0))
            .with_session_hint("1001")
            .with_viewer_count(12)
            .with_title("Ranked grind")),
        Ok(DetectionResult::live_at(Platform::Twitch, "streamer", t(1))
            .with_session_hint("1001")
            .with_viewer_count(30)),
        Err(DetectError::TransientNetwork("connection reset".into())),
        Ok(DetectionResult::offline_at(Platform::Twitch, "streamer", t(3))),
        Err(DetectError::RateLimited { retry_after: None }),
        Ok(DetectionResult::offline_at(Platform::Twitch, "streamer", t(5))),
    ];
    let binding = Binding::new("creator-1", Platform::Twitch, "streamer", Tier::Karma);
    let h = harness(ScriptedDetector::new(Platform::Twitch, script), &[binding.clone()]).await;
    let mut rx = h.monitor.subscribe();

    for _ in 0..6 {
        h.tick().await;
        h.monitor.flush_outbox().await.unwrap();
    }

    let events = drain(&mut rx);
    let kinds: Vec<_> = events.iter().map(MonitorEvent::event_type).collect();
    assert_eq!(kinds, vec!["SessionOpened", "SessionClosed"]);

    let MonitorEvent::SessionClosed(close) = &events[1] else {
        unreachable!()
    };
    assert_eq!(close.session_id, "twitch:1001");
    assert_eq!(close.closed_at, t(3));
    assert_eq!(close.duration, Duration::from_secs(180));

    let key = binding.key();
    assert!(matches!(
        h.monitor.status(&key).await.unwrap(),
        BindingStatus::Offline { since: Some(since), .. } if since == t(3)
    ));
    let sessions = h.monitor.sessions(&key, 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].peak_viewers, Some(30));
    assert_eq!(sessions[0].title.as_deref(), Some("Ranked grind"));
}

#[tokio::test]
async fn test_sustained_failures_surface_as_unverified() {
    let script = vec![
        Ok(DetectionResult::live_at(Platform::YouTube, "@chan", t(0)).with_session_hint("vid")),
        Err(DetectError::RateLimited { retry_after: None }),
        Err(DetectError::RateLimited { retry_after: None }),
        Err(DetectError::MalformedResponse("unexpected page".into())),
    ];
    let binding = Binding::new("creator-2", Platform::YouTube, "@chan", Tier::Karma);
    let h = harness(ScriptedDetector::new(Platform::YouTube, script), &[binding.clone()]).await;

    for _ in 0..4 {
        h.tick().await;
    }

    match h.monitor.status(&binding.key()).await.unwrap() {
        BindingStatus::Unverified {
            was_live,
            last_verified_at,
            reason,
            consecutive_failures,
            ..
        } => {
            assert!(was_live);
            assert_eq!(last_verified_at, Some(t(0)));
            assert_eq!(reason, "malformed_response");
            assert_eq!(consecutive_failures, 3);
        }
        other => panic!("expected unverified, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_binding_is_not_polled() {
    let (pool, _dir) = setup_test_db().await;
    let source = SqlxBindingSource::new(pool.clone());
    source
        .upsert(&Binding::new("c1", Platform::TikTok, "a", Tier::Karma), false)
        .await
        .unwrap();

    let registry = DetectorRegistry::new().with(Arc::new(ScriptedDetector::new(Platform::TikTok, vec![])));
    let monitor = Arc::new(StreamMonitor::new(
        Arc::new(SqlxLiveStatusStore::new(pool)),
        MonitorConfig::default(),
    ));
    let scheduler = TieredScheduler::new(
        Arc::new(source),
        registry.clone(),
        monitor.clone(),
        Arc::new(CredentialRefreshService::new(registry)),
        SchedulerConfig::default(),
        CancellationToken::new(),
    );

    let report = scheduler.tick(Tier::Karma).await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert!(
        monitor
            .sessions(&BindingKey::new("c1", Platform::TikTok), 1)
            .await
            .unwrap()
            .is_empty()
    );
}

fn sqlite_monitor(pool: DbPool, offline_threshold: u32) -> StreamMonitor {
    StreamMonitor::new(
        Arc::new(SqlxLiveStatusStore::new(pool)),
        MonitorConfig {
            offline_threshold,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_reopened_session_points_cover_live_time_only() {
    let (pool, _dir) = setup_test_db().await;
    let monitor = sqlite_monitor(pool, 1);
    let mut rx = monitor.subscribe();
    let key = BindingKey::new("creator-3", Platform::TikTok);

    let polls = [
        DetectionResult::live_at(Platform::TikTok, "dancer", t(0)),
        DetectionResult::offline_at(Platform::TikTok, "dancer", t(10)),
        DetectionResult::live_at(Platform::TikTok, "dancer", t(50)),
        DetectionResult::offline_at(Platform::TikTok, "dancer", t(60)),
    ];
    for result in polls {
        monitor.apply(&key, PollOutcome::Detected(result)).await.unwrap();
    }
    monitor.flush_outbox().await.unwrap();

    let events = drain(&mut rx);
    let kinds: Vec<_> = events.iter().map(MonitorEvent::event_type).collect();
    assert_eq!(kinds, vec!["SessionOpened", "SessionClosed", "SessionClosed"]);

    let accumulator = StreakAccumulator::new(Arc::new(MemoryStreakRepository::new()));
    let mut record = None;
    for event in &events {
        record = Some(accumulator.handle(event).await.unwrap());
    }
    let record = record.unwrap();

    // 20 live minutes at streak 1.
    assert_eq!(record.current_streak, 1);
    assert_eq!(record.event_points, 220);

    let sessions = monitor.sessions(&key, 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].opened_at, t(0));
    assert_eq!(sessions[0].resumed_at, t(50));
    assert_eq!(sessions[0].closed_at, Some(t(60)));
}

#[tokio::test]
async fn test_bindings_on_one_account_keep_their_own_sessions() {
    let (pool, _dir) = setup_test_db().await;
    let monitor = sqlite_monitor(pool, 1);
    let alice = BindingKey::new("alice", Platform::Twitch);
    let bob = BindingKey::new("bob", Platform::Twitch);
    let live = |at| {
        PollOutcome::Detected(
            DetectionResult::live_at(Platform::Twitch, "shared", at).with_session_hint("77"),
        )
    };

    monitor.apply(&alice, live(t(0))).await.unwrap();
    monitor.apply(&bob, live(t(0))).await.unwrap();
    monitor
        .apply(
            &bob,
            PollOutcome::Detected(DetectionResult::offline_at(Platform::Twitch, "shared", t(5))),
        )
        .await
        .unwrap();

    let alice_state = monitor.state(&alice).await.unwrap();
    assert!(alice_state.record.is_live);
    assert!(alice_state.open_session().is_some());
    let alice_sessions = monitor.sessions(&alice, 10).await.unwrap();
    assert_eq!(alice_sessions.len(), 1);
    assert!(alice_sessions[0].closed_at.is_none());

    let bob_sessions = monitor.sessions(&bob, 10).await.unwrap();
    assert_eq!(bob_sessions.len(), 1);
    assert_eq!(bob_sessions[0].session_id, "twitch:77");
    assert_eq!(bob_sessions[0].closed_at, Some(t(5)));
    assert!(!monitor.state(&bob).await.unwrap().record.is_live);
}
