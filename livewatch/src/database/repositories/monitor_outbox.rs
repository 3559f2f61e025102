//! Monitor event outbox.
//!
//! Events are written in the same transaction as the state change that
//! produced them, then delivered by a publisher task. A crash between commit
//! and delivery re-delivers on restart instead of losing the event.

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::Result;
use crate::database::time::now_ms;
use crate::domain::BindingKey;
use crate::monitor::MonitorEvent;

/// Outbox writes inside an existing transaction. Never commits.
pub struct MonitorOutboxTxOps;

impl MonitorOutboxTxOps {
    pub async fn enqueue_event(
        tx: &mut SqliteConnection,
        key: &BindingKey,
        event: &MonitorEvent,
    ) -> Result<()> {
        let payload = serde_json::to_string(event)?;

        sqlx::query(
            r#"
            INSERT INTO monitor_event_outbox (creator_id, platform, event_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.creator_id)
        .bind(key.platform.as_str())
        .bind(event.event_type())
        .bind(payload)
        .bind(now_ms())
        .execute(tx)
        .await?;

        Ok(())
    }
}

/// Publisher-side outbox operations.
pub struct MonitorOutboxOps;

impl MonitorOutboxOps {
    /// Oldest undelivered events first.
    pub async fn fetch_undelivered(pool: &SqlitePool, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, created_at, attempts
            FROM monitor_event_outbox
            WHERE delivered_at IS NULL
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxEntry {
                id: row.get("id"),
                payload: row.get("payload"),
                created_at: row.get("created_at"),
                attempts: row.get("attempts"),
            })
            .collect())
    }

    pub async fn mark_delivered(pool: &SqlitePool, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE monitor_event_outbox SET delivered_at = ?, attempts = attempts + 1, last_error = NULL WHERE id = ?",
        )
        .bind(now_ms())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_failure(pool: &SqlitePool, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE monitor_event_outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete delivered rows older than `cutoff_ms`. Undelivered rows are kept.
    pub async fn prune_delivered_before(pool: &SqlitePool, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM monitor_event_outbox WHERE delivered_at IS NOT NULL AND delivered_at < ?",
        )
        .bind(cutoff_ms)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: i64,
    pub payload: String,
    pub created_at: i64,
    pub attempts: i64,
}
