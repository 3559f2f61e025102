use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::models::RoomSnapshot;
use crate::extractor::classifier::{Classification, Indicator, PatternClassifier};
use crate::extractor::error::DetectError;
use crate::extractor::platform_extractor::{Extractor, PlatformDetector};
use crate::extractor::utils::capture_group_1;
use crate::media::{DetectionResult, Platform};

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:www\.|m\.)?tiktok\.com/@([^/?#]+)").unwrap());

static SIGI_SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="SIGI_STATE"[^>]*>(.*?)</script>"#).unwrap()
});

static SIGI_WINDOW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)window\['SIGI_STATE'\]\s*=\s*(.*?);\s*</script>"#).unwrap());

static REHYDRATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="__UNIVERSAL_DATA_FOR_REHYDRATION__"[^>]*>(.*?)</script>"#)
        .unwrap()
});

/// Indicators over a normalized TikTok room snapshot.
pub fn room_classifier(threshold: usize) -> PatternClassifier<RoomSnapshot> {
    PatternClassifier::new(
        vec![
            Indicator::new("room_id", |r: &RoomSnapshot| r.room_id.is_some()),
            Indicator::new("viewer_count", |r: &RoomSnapshot| r.user_count.is_some()),
            Indicator::new("start_time", |r: &RoomSnapshot| r.start_time.is_some()),
            Indicator::new("title", |r: &RoomSnapshot| r.title.is_some()),
            Indicator::new("live_status", |r: &RoomSnapshot| r.live_status == Some(1)),
        ],
        threshold,
    )
}

/// Scrapes the public live page; TikTok has no usable public API.
pub struct TikTok {
    extractor: Extractor,
    classifier: PatternClassifier<RoomSnapshot>,
}

impl TikTok {
    const BASE_URL: &'static str = "https://www.tiktok.com";

    pub fn new(client: Client, threshold: usize) -> Self {
        let mut extractor = Extractor::new(Platform::TikTok, client);
        extractor.add_header_owned(
            reqwest::header::REFERER,
            reqwest::header::HeaderValue::from_static(Self::BASE_URL),
        );
        Self {
            extractor,
            classifier: room_classifier(threshold),
        }
    }

    pub fn normalize_account(account_ref: &str) -> String {
        let trimmed = account_ref.trim();
        capture_group_1(&URL_REGEX, trimmed)
            .unwrap_or(trimmed)
            .trim_start_matches('@')
            .to_string()
    }

    /// The embedded state blob, in whichever form the page ships.
    pub(crate) fn extract_state(html: &str) -> Result<Value, DetectError> {
        let raw = capture_group_1(&SIGI_SCRIPT_REGEX, html)
            .or_else(|| capture_group_1(&SIGI_WINDOW_REGEX, html))
            .or_else(|| capture_group_1(&REHYDRATION_REGEX, html))
            .ok_or_else(|| DetectError::malformed("no embedded state on tiktok page"))?;
        Ok(serde_json::from_str(raw.trim())?)
    }

    pub(crate) fn classify_page(
        &self,
        account: &str,
        html: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<(DetectionResult, Classification), DetectError> {
        let state = Self::extract_state(html)?;
        let snapshot = RoomSnapshot::from_state(&state, account);
        let classification = self.classifier.classify(&snapshot);

        if !classification.is_live {
            return Ok((
                DetectionResult::offline_at(Platform::TikTok, account, fetched_at),
                classification,
            ));
        }

        let title = snapshot
            .title
            .unwrap_or_else(|| format!("{account} Live Stream"));
        let mut result =
            DetectionResult::live_at(Platform::TikTok, account, fetched_at).with_title(title);
        if let Some(room_id) = snapshot.room_id {
            result = result.with_session_hint(room_id);
        }
        if let Some(count) = snapshot.user_count {
            result = result.with_viewer_count(count);
        }
        if let Some(started) = snapshot.start_time {
            result = result.with_started_at(started);
        }
        Ok((result, classification))
    }
}

#[async_trait]
impl PlatformDetector for TikTok {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn detect(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
        let account = Self::normalize_account(account_ref);
        let url = format!("{}/@{}/live", Self::BASE_URL, account);
        let html = self.extractor.send_text(self.extractor.get(&url)).await?;

        let (result, classification) = self.classify_page(&account, &html, Utc::now())?;
        debug!(
            account = %account,
            matched = ?classification.matched,
            is_live = result.is_live,
            "TikTok page classified"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::default_client;

    fn page(state: &str) -> String {
        format!(
            r#"<html><script id="SIGI_STATE" type="application/json">{state}</script></html>"#
        )
    }

    #[test]
    fn test_one_indicator_is_offline() {
        let tiktok = TikTok::new(default_client().unwrap(), 2);
        let html = page(r#"{"LiveRoom":{"liveRoomInfo":{"roomId":"99"}}}"#);
        let (result, classification) = tiktok.classify_page("someone", &html, Utc::now()).unwrap();
        assert!(!result.is_live);
        assert_eq!(classification.matched, vec!["room_id"]);
    }

    #[test]
    fn test_two_indicators_live_with_default_title() {
        let tiktok = TikTok::new(default_client().unwrap(), 2);
        let html = page(r#"{"LiveRoom":{"liveRoomInfo":{"roomId":"99","userCount":12}}}"#);
        let (result, _) = tiktok.classify_page("someone", &html, Utc::now()).unwrap();
        assert!(result.is_live);
        assert_eq!(result.title.as_deref(), Some("someone Live Stream"));
        assert_eq!(result.session_hint.as_deref(), Some("99"));
        assert_eq!(result.viewer_count, Some(12));
        assert!(result.started_at.is_none());
    }

    #[test]
    fn test_window_assignment_form() {
        let html = r#"<script>window['SIGI_STATE'] = {"Live":{"liveStatus":1}};</script>"#;
        let state = TikTok::extract_state(html).unwrap();
        assert_eq!(state["Live"]["liveStatus"], 1);
    }

    #[test]
    fn test_missing_state_is_malformed() {
        let err = TikTok::extract_state("<html></html>").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_normalize_account() {
        assert_eq!(TikTok::normalize_account("@someone"), "someone");
        assert_eq!(
            TikTok::normalize_account("https://www.tiktok.com/@someone/live"),
            "someone"
        );
    }

    #[test]
    fn test_rehydration_page_classifies_live() {
        let tiktok = TikTok::new(default_client().unwrap(), 2);
        let html = r#"<html><script id="__UNIVERSAL_DATA_FOR_REHYDRATION__" type="application/json">
            {"__DEFAULT_SCOPE__":{"webapp.live-detail":{"liveRoom":{
                "id_str":"88","status":2,"liveRoomStats":{"userCount":5}}}}}
            </script></html>"#;
        let (result, classification) = tiktok.classify_page("someone", html, Utc::now()).unwrap();
        assert!(result.is_live);
        assert_eq!(result.session_hint.as_deref(), Some("88"));
        assert_eq!(
            classification.matched,
            vec!["room_id", "viewer_count", "live_status"]
        );
    }
}
