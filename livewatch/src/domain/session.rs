use std::time::Duration;

use chrono::{DateTime, Utc};
use live_platforms::{DetectionResult, Platform};
use serde::{Deserialize, Serialize};

/// Session id for a live result.
///
/// A platform-supplied hint gives `"{platform}:{hint}"`. Without one the id is
/// synthesized from the UTC calendar day of `fetched_at`, so two broadcasts on
/// the same day collapse into one session.
pub fn derive_session_id(creator_id: &str, result: &DetectionResult) -> String {
    match result.session_hint.as_deref().filter(|h| !h.is_empty()) {
        Some(hint) => format!("{}:{}", result.platform, hint),
        None => format!(
            "{}:{}:{}",
            creator_id,
            result.platform,
            result.fetched_at.format("%Y-%m-%d")
        ),
    }
}

/// One continuous broadcast of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSession {
    pub session_id: String,
    pub creator_id: String,
    pub platform: Platform,
    pub opened_at: DateTime<Utc>,
    /// Start of the current live segment. Equals `opened_at` until the session
    /// is resumed after a close.
    pub resumed_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Broadcast start reported by the platform, if any.
    pub started_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub viewer_count: Option<u64>,
    pub peak_viewers: Option<u64>,
}

impl StreamSession {
    pub fn open(session_id: String, creator_id: &str, result: &DetectionResult) -> Self {
        Self {
            session_id,
            creator_id: creator_id.to_string(),
            platform: result.platform,
            opened_at: result.fetched_at,
            resumed_at: result.fetched_at,
            closed_at: None,
            started_at: result.started_at,
            title: result.title.clone(),
            viewer_count: result.viewer_count,
            peak_viewers: result.viewer_count,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Refresh metadata from a newer live result. Absent fields keep their value.
    pub fn update_from(&mut self, result: &DetectionResult) {
        if let Some(title) = &result.title {
            self.title = Some(title.clone());
        }
        if let Some(viewers) = result.viewer_count {
            self.viewer_count = Some(viewers);
            self.peak_viewers = Some(self.peak_viewers.map_or(viewers, |p| p.max(viewers)));
        }
        if self.started_at.is_none() {
            self.started_at = result.started_at;
        }
    }

    /// Reopen a closed session for a new live segment starting at `at`.
    pub fn resume(&mut self, at: DateTime<Utc>) {
        self.closed_at = None;
        self.resumed_at = at;
    }

    /// Time between open and close; zero while open or if the clock went backwards.
    pub fn duration(&self) -> Duration {
        self.span_from(self.opened_at)
    }

    /// Length of the last live segment, from `resumed_at` to close.
    pub fn segment_duration(&self) -> Duration {
        self.span_from(self.resumed_at)
    }

    fn span_from(&self, start: DateTime<Utc>) -> Duration {
        self.closed_at
            .and_then(|closed| (closed - start).to_std().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_session_id_from_hint() {
        let result = DetectionResult::live_at(Platform::Twitch, "someone", at(10, 0))
            .with_session_hint("4242");
        assert_eq!(derive_session_id("c1", &result), "twitch:4242");
    }

    #[test]
    fn test_session_id_synthesized_per_utc_day() {
        let morning = DetectionResult::live_at(Platform::TikTok, "someone", at(1, 0));
        let evening = DetectionResult::live_at(Platform::TikTok, "someone", at(23, 59));
        assert_eq!(derive_session_id("c1", &morning), "c1:tiktok:2024-05-01");
        assert_eq!(
            derive_session_id("c1", &morning),
            derive_session_id("c1", &evening)
        );
    }

    #[test]
    fn test_update_tracks_peak_and_keeps_missing_fields() {
        let first = DetectionResult::live_at(Platform::Twitch, "someone", at(10, 0))
            .with_viewer_count(50)
            .with_title("first");
        let mut session = StreamSession::open("twitch:1".into(), "c1", &first);

        let second = DetectionResult::live_at(Platform::Twitch, "someone", at(10, 1))
            .with_viewer_count(0);
        session.update_from(&second);

        assert_eq!(session.viewer_count, Some(0));
        assert_eq!(session.peak_viewers, Some(50));
        assert_eq!(session.title.as_deref(), Some("first"));
    }

    #[test]
    fn test_duration() {
        let result = DetectionResult::live_at(Platform::Twitch, "someone", at(10, 0));
        let mut session = StreamSession::open("twitch:1".into(), "c1", &result);
        assert_eq!(session.duration(), Duration::ZERO);
        session.closed_at = Some(at(11, 30));
        assert_eq!(session.duration(), Duration::from_secs(90 * 60));
        assert_eq!(session.segment_duration(), Duration::from_secs(90 * 60));
    }

    #[test]
    fn test_resumed_segment_excludes_earlier_span() {
        let result = DetectionResult::live_at(Platform::TikTok, "someone", at(10, 0));
        let mut session = StreamSession::open("c1:tiktok:2024-05-01".into(), "c1", &result);
        session.closed_at = Some(at(10, 10));
        session.resume(at(10, 50));
        assert!(session.is_open());
        session.closed_at = Some(at(11, 0));

        assert_eq!(session.opened_at, at(10, 0));
        assert_eq!(session.duration(), Duration::from_secs(60 * 60));
        assert_eq!(session.segment_duration(), Duration::from_secs(10 * 60));
    }
}
