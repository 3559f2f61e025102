//! Daily streaks and event points.
//!
//! The first session of a UTC day extends the streak if the previous session
//! day was yesterday and restarts it at 1 otherwise. Closing a session credits
//! `minutes * 10 * (1 + 0.1 * streak)` points.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::repositories::{StreakRecord, StreakRepository};
use crate::monitor::MonitorEvent;

/// Streak after streaming on `day`.
pub fn advance_streak(record: &StreakRecord, day: NaiveDate) -> u32 {
    match record.last_stream_date {
        Some(last) if last == day => record.current_streak.max(1),
        Some(last) if last.succ_opt() == Some(day) => record.current_streak.saturating_add(1),
        _ => 1,
    }
}

/// Points for a session of `minutes` at the given streak.
///
/// `minutes * 10 * (1 + streak / 10)` is computed as `minutes * (10 + streak)`
/// so there is no rounding.
pub fn event_points(minutes: u64, streak: u32) -> u64 {
    minutes.saturating_mul(10 + u64::from(streak))
}

pub struct StreakAccumulator {
    repo: Arc<dyn StreakRepository>,
}

impl StreakAccumulator {
    pub fn new(repo: Arc<dyn StreakRepository>) -> Self {
        Self { repo }
    }

    pub async fn handle(&self, event: &MonitorEvent) -> Result<StreakRecord> {
        let creator_id = event.creator_id();
        let mut record = self
            .repo
            .load(creator_id)
            .await?
            .unwrap_or_else(|| StreakRecord::new(creator_id));

        match event {
            MonitorEvent::SessionOpened(open) => {
                let day = open.opened_at.date_naive();
                if record.last_stream_date == Some(day) {
                    debug!(creator_id, %day, "Already streamed today");
                    return Ok(record);
                }
                record.current_streak = advance_streak(&record, day);
                record.last_stream_date = Some(day);
                info!(creator_id, streak = record.current_streak, "Streak updated");
            }
            MonitorEvent::SessionClosed(close) => {
                // A close without a recorded open (e.g. data from before this
                // consumer existed) still counts for the day its segment started.
                let day = close.resumed_at.date_naive();
                if record.last_stream_date.is_none_or(|last| last < day) {
                    record.current_streak = advance_streak(&record, day);
                    record.last_stream_date = Some(day);
                }
                let minutes = close.duration.as_secs() / 60;
                let points = event_points(minutes, record.current_streak);
                record.event_points = record.event_points.saturating_add(points);
                info!(
                    creator_id,
                    minutes,
                    points,
                    total = record.event_points,
                    "Event points credited"
                );
            }
        }

        self.repo.save(&record).await?;
        Ok(record)
    }

    /// Consume events until cancelled or the sender is dropped.
    pub async fn run(&self, mut rx: broadcast::Receiver<MonitorEvent>, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.handle(&event).await {
                            warn!(creator_id = event.creator_id(), "Failed to update streak: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Streak accumulator lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("Streak accumulator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::MemoryStreakRepository;
    use crate::monitor::{SessionCloseEvent, SessionOpenEvent};
    use chrono::{DateTime, TimeZone, Utc};
    use live_platforms::Platform;
    use std::time::Duration;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 18, 0, 0).unwrap()
    }

    fn opened(at: DateTime<Utc>) -> MonitorEvent {
        MonitorEvent::SessionOpened(SessionOpenEvent {
            creator_id: "c1".into(),
            platform: Platform::Twitch,
            session_id: format!("twitch:{}", at.timestamp()),
            viewer_count: None,
            title: None,
            started_at: None,
            opened_at: at,
        })
    }

    fn closed(at: DateTime<Utc>, minutes: u64) -> MonitorEvent {
        MonitorEvent::SessionClosed(SessionCloseEvent {
            creator_id: "c1".into(),
            platform: Platform::Twitch,
            session_id: format!("twitch:{}", at.timestamp()),
            opened_at: at,
            resumed_at: at,
            closed_at: at + chrono::Duration::minutes(minutes as i64),
            duration: Duration::from_secs(minutes * 60),
        })
    }

    #[test]
    fn test_points_formula() {
        assert_eq!(event_points(60, 0), 600);
        assert_eq!(event_points(60, 1), 660);
        assert_eq!(event_points(90, 5), 1350);
    }

    #[tokio::test]
    async fn test_consecutive_days_extend_streak() {
        let accumulator = StreakAccumulator::new(Arc::new(MemoryStreakRepository::new()));
        assert_eq!(accumulator.handle(&opened(day(1))).await.unwrap().current_streak, 1);
        assert_eq!(accumulator.handle(&opened(day(2))).await.unwrap().current_streak, 2);
        // Same day again: unchanged.
        assert_eq!(accumulator.handle(&opened(day(2))).await.unwrap().current_streak, 2);
        // Gap resets.
        assert_eq!(accumulator.handle(&opened(day(5))).await.unwrap().current_streak, 1);
    }

    #[tokio::test]
    async fn test_close_credits_points_with_multiplier() {
        let accumulator = StreakAccumulator::new(Arc::new(MemoryStreakRepository::new()));
        accumulator.handle(&opened(day(1))).await.unwrap();
        accumulator.handle(&closed(day(1), 30)).await.unwrap();
        accumulator.handle(&opened(day(2))).await.unwrap();
        let record = accumulator.handle(&closed(day(2), 60)).await.unwrap();

        // 30 * 11 + 60 * 12
        assert_eq!(record.event_points, 330 + 720);
        assert_eq!(record.current_streak, 2);
    }

    #[tokio::test]
    async fn test_close_without_open_counts_the_day() {
        let accumulator = StreakAccumulator::new(Arc::new(MemoryStreakRepository::new()));
        let record = accumulator.handle(&closed(day(3), 10)).await.unwrap();
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.event_points, 110);
    }

    #[tokio::test]
    async fn test_resumed_session_credits_only_the_new_segment() {
        let accumulator = StreakAccumulator::new(Arc::new(MemoryStreakRepository::new()));
        let start = day(1);
        accumulator.handle(&opened(start)).await.unwrap();
        accumulator.handle(&closed(start, 10)).await.unwrap();

        let resumed = MonitorEvent::SessionClosed(SessionCloseEvent {
            creator_id: "c1".into(),
            platform: Platform::Twitch,
            session_id: format!("twitch:{}", start.timestamp()),
            opened_at: start,
            resumed_at: start + chrono::Duration::minutes(50),
            closed_at: start + chrono::Duration::minutes(60),
            duration: Duration::from_secs(10 * 60),
        });
        let record = accumulator.handle(&resumed).await.unwrap();

        // Two ten-minute segments at streak 1.
        assert_eq!(record.event_points, 220);
        assert_eq!(record.current_streak, 1);
    }
}
