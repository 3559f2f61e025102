use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime, opt_ms_to_datetime};
use crate::domain::StreamSession;
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct StreamSessionDbModel {
    pub session_id: String,
    pub creator_id: String,
    pub platform: String,
    pub opened_at: i64,
    pub resumed_at: i64,
    pub closed_at: Option<i64>,
    pub started_at: Option<i64>,
    pub title: Option<String>,
    pub viewer_count: Option<i64>,
    pub peak_viewers: Option<i64>,
}

impl From<&StreamSession> for StreamSessionDbModel {
    fn from(session: &StreamSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            creator_id: session.creator_id.clone(),
            platform: session.platform.as_str().to_string(),
            opened_at: datetime_to_ms(session.opened_at),
            resumed_at: datetime_to_ms(session.resumed_at),
            closed_at: session.closed_at.map(datetime_to_ms),
            started_at: session.started_at.map(datetime_to_ms),
            title: session.title.clone(),
            viewer_count: session.viewer_count.and_then(|v| i64::try_from(v).ok()),
            peak_viewers: session.peak_viewers.and_then(|v| i64::try_from(v).ok()),
        }
    }
}

impl TryFrom<StreamSessionDbModel> for StreamSession {
    type Error = Error;

    fn try_from(row: StreamSessionDbModel) -> Result<Self> {
        let platform = row
            .platform
            .parse()
            .map_err(|_| Error::Database(format!("unknown platform '{}'", row.platform)))?;
        Ok(Self {
            session_id: row.session_id,
            creator_id: row.creator_id,
            platform,
            opened_at: ms_to_datetime(row.opened_at),
            resumed_at: ms_to_datetime(row.resumed_at),
            closed_at: opt_ms_to_datetime(row.closed_at),
            started_at: opt_ms_to_datetime(row.started_at),
            title: row.title,
            viewer_count: row.viewer_count.and_then(|v| u64::try_from(v).ok()),
            peak_viewers: row.peak_viewers.and_then(|v| u64::try_from(v).ok()),
        })
    }
}
