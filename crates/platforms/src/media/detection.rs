use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Outcome of a single successful live check.
///
/// `viewer_count` distinguishes "unknown" (`None`) from a live stream with no
/// viewers (`Some(0)`); both are meaningful and must be kept apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub platform: Platform,
    pub account_ref: String,
    pub is_live: bool,
    /// Stable per-broadcast token from the platform (stream id, video id, room id).
    pub session_hint: Option<String>,
    pub viewer_count: Option<u64>,
    pub title: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl DetectionResult {
    /// An offline result fetched now.
    pub fn offline(platform: Platform, account_ref: impl Into<String>) -> Self {
        Self::offline_at(platform, account_ref, Utc::now())
    }

    pub fn offline_at(
        platform: Platform,
        account_ref: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            platform,
            account_ref: account_ref.into(),
            is_live: false,
            session_hint: None,
            viewer_count: None,
            title: None,
            started_at: None,
            fetched_at,
        }
    }

    /// A live result with no metadata, fetched at `fetched_at`.
    pub fn live_at(
        platform: Platform,
        account_ref: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            is_live: true,
            ..Self::offline_at(platform, account_ref, fetched_at)
        }
    }

    pub fn with_session_hint(mut self, hint: impl Into<String>) -> Self {
        self.session_hint = Some(hint.into());
        self
    }

    pub fn with_viewer_count(mut self, viewer_count: u64) -> Self {
        self.viewer_count = Some(viewer_count);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }
}
