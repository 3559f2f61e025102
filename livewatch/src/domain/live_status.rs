use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::StreamSession;

/// Persisted per-binding state.
///
/// `is_live` implies `current_session_id.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatusRecord {
    pub is_live: bool,
    pub current_session_id: Option<String>,
    pub consecutive_miss_count: u32,
    /// Last time any poll finished for this binding, successful or not.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// `fetched_at` of the newest applied detection. Older results are dropped.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Time of the first offline poll in the current miss streak, kept after close.
    pub offline_since: Option<DateTime<Utc>>,
    pub consecutive_unknown_count: u32,
    pub last_unknown_reason: Option<String>,
    /// Most recent session, open or closed.
    pub last_session_id: Option<String>,
}

/// In-memory view of a binding: the record plus its most recent session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingState {
    pub record: LiveStatusRecord,
    pub session: Option<StreamSession>,
}

impl BindingState {
    pub fn open_session(&self) -> Option<&StreamSession> {
        self.session.as_ref().filter(|s| {
            s.is_open() && self.record.current_session_id.as_deref() == Some(s.session_id.as_str())
        })
    }

    pub fn status(&self) -> BindingStatus {
        let record = &self.record;
        if record.consecutive_unknown_count > 0 {
            return BindingStatus::Unverified {
                was_live: record.is_live,
                last_checked_at: record.last_checked_at,
                last_verified_at: record.last_fetched_at,
                reason: record.last_unknown_reason.clone().unwrap_or_default(),
                consecutive_failures: record.consecutive_unknown_count,
            };
        }
        match (record.is_live, self.open_session()) {
            (true, Some(session)) => BindingStatus::Live {
                session_id: session.session_id.clone(),
                since: session.opened_at,
                viewer_count: session.viewer_count,
                title: session.title.clone(),
            },
            _ => BindingStatus::Offline {
                since: record.offline_since,
                last_checked_at: record.last_checked_at,
            },
        }
    }
}

/// Caller-facing summary of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingStatus {
    Live {
        session_id: String,
        since: DateTime<Utc>,
        viewer_count: Option<u64>,
        title: Option<String>,
    },
    Offline {
        since: Option<DateTime<Utc>>,
        last_checked_at: Option<DateTime<Utc>>,
    },
    /// Recent polls could not verify the state; the last known state is kept.
    Unverified {
        was_live: bool,
        last_checked_at: Option<DateTime<Utc>>,
        last_verified_at: Option<DateTime<Utc>>,
        reason: String,
        consecutive_failures: u32,
    },
}

impl BindingStatus {
    pub fn is_live(&self) -> bool {
        match self {
            Self::Live { .. } => true,
            Self::Unverified { was_live, .. } => *was_live,
            Self::Offline { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_offline() {
        let state = BindingState::default();
        assert!(!state.status().is_live());
        assert!(state.open_session().is_none());
    }

    #[test]
    fn test_unverified_keeps_last_known_state() {
        let state = BindingState {
            record: LiveStatusRecord {
                is_live: true,
                current_session_id: Some("twitch:1".into()),
                consecutive_unknown_count: 3,
                last_unknown_reason: Some("timeout".into()),
                ..Default::default()
            },
            session: None,
        };
        let status = state.status();
        assert!(status.is_live());
        assert!(matches!(
            status,
            BindingStatus::Unverified { consecutive_failures: 3, .. }
        ));
    }
}
