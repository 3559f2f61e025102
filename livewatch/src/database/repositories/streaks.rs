//! Persistence for daily streaming streaks.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::Result;
use crate::database::DbPool;
use crate::database::time::now_ms;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreakRecord {
    pub creator_id: String,
    pub current_streak: u32,
    pub event_points: u64,
    /// UTC date of the last day the creator went live.
    pub last_stream_date: Option<NaiveDate>,
}

impl StreakRecord {
    pub fn new(creator_id: impl Into<String>) -> Self {
        Self {
            creator_id: creator_id.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait StreakRepository: Send + Sync {
    async fn load(&self, creator_id: &str) -> Result<Option<StreakRecord>>;
    async fn save(&self, record: &StreakRecord) -> Result<()>;
}

pub struct SqlxStreakRepository {
    pool: DbPool,
}

impl SqlxStreakRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreakRepository for SqlxStreakRepository {
    async fn load(&self, creator_id: &str) -> Result<Option<StreakRecord>> {
        let row: Option<(i64, i64, Option<String>)> = sqlx::query_as(
            "SELECT current_streak, event_points, last_stream_date FROM event_streaks WHERE creator_id = ?",
        )
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(streak, points, date)| StreakRecord {
            creator_id: creator_id.to_string(),
            current_streak: u32::try_from(streak).unwrap_or(0),
            event_points: u64::try_from(points).unwrap_or(0),
            last_stream_date: date.and_then(|d| d.parse().ok()),
        }))
    }

    async fn save(&self, record: &StreakRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_streaks (creator_id, current_streak, event_points, last_stream_date, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(creator_id) DO UPDATE SET
                current_streak = excluded.current_streak,
                event_points = excluded.event_points,
                last_stream_date = excluded.last_stream_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.creator_id)
        .bind(i64::from(record.current_streak))
        .bind(i64::try_from(record.event_points).unwrap_or(i64::MAX))
        .bind(record.last_stream_date.map(|d| d.to_string()))
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Process-local streaks.
#[derive(Debug, Default)]
pub struct MemoryStreakRepository {
    records: DashMap<String, StreakRecord>,
}

impl MemoryStreakRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreakRepository for MemoryStreakRepository {
    async fn load(&self, creator_id: &str) -> Result<Option<StreakRecord>> {
        Ok(self.records.get(creator_id).map(|r| r.clone()))
    }

    async fn save(&self, record: &StreakRecord) -> Result<()> {
        self.records
            .insert(record.creator_id.clone(), record.clone());
        Ok(())
    }
}
