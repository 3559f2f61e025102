//! Persistence of per-binding live status, sessions and their outbox events.
//!
//! A [`Transition`] is committed as a unit: the status row, every touched
//! session and every emitted event land in one `BEGIN IMMEDIATE` transaction
//! or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqliteConnection;

use super::monitor_outbox::{MonitorOutboxOps, MonitorOutboxTxOps, OutboxEntry};
use crate::Result;
use crate::database::models::{LiveStatusDbModel, StreamSessionDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::database::{DbPool, begin_immediate};
use crate::domain::{BindingKey, BindingState, LiveStatusRecord, StreamSession};
use crate::monitor::Transition;

/// Storage behind the stream monitor.
#[async_trait]
pub trait LiveStatusStore: Send + Sync {
    /// Current state of a binding, or `None` if it was never polled.
    async fn load(&self, key: &BindingKey) -> Result<Option<BindingState>>;

    /// Atomically persist a transition together with its events.
    async fn commit(&self, key: &BindingKey, transition: &Transition) -> Result<()>;

    /// Sessions of a binding, newest first.
    async fn sessions(&self, key: &BindingKey, limit: usize) -> Result<Vec<StreamSession>>;

    async fn fetch_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>>;
    async fn mark_delivered(&self, id: i64) -> Result<()>;
    async fn record_failure(&self, id: i64, error: &str) -> Result<()>;
    async fn prune_delivered_before(&self, cutoff_ms: i64) -> Result<u64>;
}

/// Status and session writes inside an existing transaction. Never commits.
pub struct LiveStatusTxOps;

impl LiveStatusTxOps {
    pub async fn upsert_status(tx: &mut SqliteConnection, row: &LiveStatusDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_status (
                creator_id, platform, is_live, current_session_id, consecutive_miss_count,
                last_checked_at, last_fetched_at, offline_since, consecutive_unknown_count,
                last_unknown_reason, last_session_id, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(creator_id, platform) DO UPDATE SET
                is_live = excluded.is_live,
                current_session_id = excluded.current_session_id,
                consecutive_miss_count = excluded.consecutive_miss_count,
                last_checked_at = excluded.last_checked_at,
                last_fetched_at = excluded.last_fetched_at,
                offline_since = excluded.offline_since,
                consecutive_unknown_count = excluded.consecutive_unknown_count,
                last_unknown_reason = excluded.last_unknown_reason,
                last_session_id = excluded.last_session_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.creator_id)
        .bind(&row.platform)
        .bind(row.is_live)
        .bind(&row.current_session_id)
        .bind(row.consecutive_miss_count)
        .bind(row.last_checked_at)
        .bind(row.last_fetched_at)
        .bind(row.offline_since)
        .bind(row.consecutive_unknown_count)
        .bind(&row.last_unknown_reason)
        .bind(&row.last_session_id)
        .bind(row.updated_at)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// Insert or update a session of one binding. `opened_at` of an existing
    /// row is kept.
    pub async fn upsert_session(tx: &mut SqliteConnection, row: &StreamSessionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_sessions (
                creator_id, platform, session_id, opened_at, resumed_at, closed_at,
                started_at, title, viewer_count, peak_viewers
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(creator_id, platform, session_id) DO UPDATE SET
                resumed_at = excluded.resumed_at,
                closed_at = excluded.closed_at,
                started_at = COALESCE(stream_sessions.started_at, excluded.started_at),
                title = excluded.title,
                viewer_count = excluded.viewer_count,
                peak_viewers = excluded.peak_viewers
            "#,
        )
        .bind(&row.creator_id)
        .bind(&row.platform)
        .bind(&row.session_id)
        .bind(row.opened_at)
        .bind(row.resumed_at)
        .bind(row.closed_at)
        .bind(row.started_at)
        .bind(&row.title)
        .bind(row.viewer_count)
        .bind(row.peak_viewers)
        .execute(tx)
        .await?;
        Ok(())
    }
}

pub struct SqlxLiveStatusStore {
    pool: DbPool,
}

impl SqlxLiveStatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_session(&self, key: &BindingKey, session_id: &str) -> Result<Option<StreamSession>> {
        let row = sqlx::query_as::<_, StreamSessionDbModel>(
            "SELECT * FROM stream_sessions WHERE creator_id = ? AND platform = ? AND session_id = ?",
        )
        .bind(&key.creator_id)
        .bind(key.platform.as_str())
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StreamSession::try_from).transpose()
    }
}

#[async_trait]
impl LiveStatusStore for SqlxLiveStatusStore {
    async fn load(&self, key: &BindingKey) -> Result<Option<BindingState>> {
        let row = sqlx::query_as::<_, LiveStatusDbModel>(
            "SELECT * FROM live_status WHERE creator_id = ? AND platform = ?",
        )
        .bind(&key.creator_id)
        .bind(key.platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = row.into_record();
        let session = match record.last_session_id.as_deref() {
            Some(id) => self.load_session(key, id).await?,
            None => None,
        };
        Ok(Some(BindingState { record, session }))
    }

    async fn commit(&self, key: &BindingKey, transition: &Transition) -> Result<()> {
        let status = LiveStatusDbModel::from_record(key, &transition.state.record, now_ms());
        let sessions: Vec<StreamSessionDbModel> =
            transition.sessions.iter().map(StreamSessionDbModel::from).collect();
        let pool = &self.pool;
        let status = &status;
        let sessions = &sessions;

        retry_on_sqlite_busy("commit_transition", || async move {
            let mut tx = begin_immediate(pool).await?;
            LiveStatusTxOps::upsert_status(&mut tx, status).await?;
            for session in sessions {
                LiveStatusTxOps::upsert_session(&mut tx, session).await?;
            }
            for event in &transition.events {
                MonitorOutboxTxOps::enqueue_event(&mut tx, key, event).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn sessions(&self, key: &BindingKey, limit: usize) -> Result<Vec<StreamSession>> {
        let rows = sqlx::query_as::<_, StreamSessionDbModel>(
            "SELECT * FROM stream_sessions WHERE creator_id = ? AND platform = ? ORDER BY opened_at DESC LIMIT ?",
        )
        .bind(&key.creator_id)
        .bind(key.platform.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StreamSession::try_from).collect()
    }

    async fn fetch_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        MonitorOutboxOps::fetch_undelivered(&self.pool, i64::try_from(limit).unwrap_or(i64::MAX))
            .await
    }

    async fn mark_delivered(&self, id: i64) -> Result<()> {
        MonitorOutboxOps::mark_delivered(&self.pool, id).await
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<()> {
        MonitorOutboxOps::record_failure(&self.pool, id, error).await
    }

    async fn prune_delivered_before(&self, cutoff_ms: i64) -> Result<u64> {
        MonitorOutboxOps::prune_delivered_before(&self.pool, cutoff_ms).await
    }
}

#[derive(Debug, Clone)]
struct MemoryOutboxRow {
    entry: OutboxEntry,
    delivered_at: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<BindingKey, LiveStatusRecord>,
    sessions: HashMap<(BindingKey, String), StreamSession>,
    outbox: Vec<MemoryOutboxRow>,
    next_outbox_id: i64,
}

/// Process-local store for tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryLiveStatusStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryLiveStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LiveStatusStore for MemoryLiveStatusStore {
    async fn load(&self, key: &BindingKey) -> Result<Option<BindingState>> {
        let inner = self.inner.lock();
        Ok(inner.records.get(key).map(|record| BindingState {
            record: record.clone(),
            session: record
                .last_session_id
                .as_ref()
                .and_then(|id| inner.sessions.get(&(key.clone(), id.clone())).cloned()),
        }))
    }

    async fn commit(&self, key: &BindingKey, transition: &Transition) -> Result<()> {
        // Serialize payloads before touching state so a failure leaves nothing behind.
        let payloads = transition
            .events
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut inner = self.inner.lock();
        inner
            .records
            .insert(key.clone(), transition.state.record.clone());
        for session in &transition.sessions {
            let mut session = session.clone();
            let session_key = (key.clone(), session.session_id.clone());
            if let Some(existing) = inner.sessions.get(&session_key) {
                session.opened_at = existing.opened_at;
            }
            inner.sessions.insert(session_key, session);
        }
        let created_at = now_ms();
        for payload in payloads {
            inner.next_outbox_id += 1;
            let id = inner.next_outbox_id;
            inner.outbox.push(MemoryOutboxRow {
                entry: OutboxEntry {
                    id,
                    payload,
                    created_at,
                    attempts: 0,
                },
                delivered_at: None,
            });
        }
        Ok(())
    }

    async fn sessions(&self, key: &BindingKey, limit: usize) -> Result<Vec<StreamSession>> {
        let inner = self.inner.lock();
        let mut sessions: Vec<StreamSession> = inner
            .sessions
            .iter()
            .filter(|((binding, _), _)| binding == key)
            .map(|(_, session)| session.clone())
            .collect();
        sessions.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn fetch_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .outbox
            .iter()
            .filter(|row| row.delivered_at.is_none())
            .take(limit)
            .map(|row| row.entry.clone())
            .collect())
    }

    async fn mark_delivered(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.outbox.iter_mut().find(|row| row.entry.id == id) {
            row.delivered_at = Some(now_ms());
            row.entry.attempts += 1;
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, _error: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.outbox.iter_mut().find(|row| row.entry.id == id) {
            row.entry.attempts += 1;
        }
        Ok(())
    }

    async fn prune_delivered_before(&self, cutoff_ms: i64) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.outbox.len();
        inner
            .outbox
            .retain(|row| row.delivered_at.is_none_or(|at| at >= cutoff_ms));
        Ok((before - inner.outbox.len()) as u64)
    }
}
