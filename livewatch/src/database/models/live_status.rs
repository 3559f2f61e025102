use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, opt_ms_to_datetime};
use crate::domain::{BindingKey, LiveStatusRecord};

/// One row of `live_status`. Timestamps are Unix epoch milliseconds (UTC).
#[derive(Debug, Clone, FromRow)]
pub struct LiveStatusDbModel {
    pub creator_id: String,
    pub platform: String,
    pub is_live: bool,
    pub current_session_id: Option<String>,
    pub consecutive_miss_count: i64,
    pub last_checked_at: Option<i64>,
    pub last_fetched_at: Option<i64>,
    pub offline_since: Option<i64>,
    pub consecutive_unknown_count: i64,
    pub last_unknown_reason: Option<String>,
    pub last_session_id: Option<String>,
    pub updated_at: i64,
}

impl LiveStatusDbModel {
    pub fn from_record(key: &BindingKey, record: &LiveStatusRecord, updated_at: i64) -> Self {
        Self {
            creator_id: key.creator_id.clone(),
            platform: key.platform.as_str().to_string(),
            is_live: record.is_live,
            current_session_id: record.current_session_id.clone(),
            consecutive_miss_count: i64::from(record.consecutive_miss_count),
            last_checked_at: record.last_checked_at.map(datetime_to_ms),
            last_fetched_at: record.last_fetched_at.map(datetime_to_ms),
            offline_since: record.offline_since.map(datetime_to_ms),
            consecutive_unknown_count: i64::from(record.consecutive_unknown_count),
            last_unknown_reason: record.last_unknown_reason.clone(),
            last_session_id: record.last_session_id.clone(),
            updated_at,
        }
    }

    pub fn into_record(self) -> LiveStatusRecord {
        LiveStatusRecord {
            is_live: self.is_live && self.current_session_id.is_some(),
            current_session_id: self.current_session_id,
            consecutive_miss_count: u32::try_from(self.consecutive_miss_count).unwrap_or(0),
            last_checked_at: opt_ms_to_datetime(self.last_checked_at),
            last_fetched_at: opt_ms_to_datetime(self.last_fetched_at),
            offline_since: opt_ms_to_datetime(self.offline_since),
            consecutive_unknown_count: u32::try_from(self.consecutive_unknown_count).unwrap_or(0),
            last_unknown_reason: self.last_unknown_reason,
            last_session_id: self.last_session_id,
        }
    }
}
