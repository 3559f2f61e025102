use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use super::auth::TokenManager;
use super::models::HelixStreamsResponse;
use crate::extractor::error::DetectError;
use crate::extractor::platform_extractor::{Extractor, PlatformDetector};
use crate::extractor::utils::capture_group_1;
use crate::media::{DetectionResult, Platform};

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:www\.|m\.)?twitch\.tv/([^/?#]+)").unwrap());

static LOGIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,25}$").unwrap());

/// Helix-backed Twitch detector.
pub struct Twitch {
    extractor: Extractor,
    tokens: Arc<TokenManager>,
}

impl Twitch {
    const STREAMS_URL: &'static str = "https://api.twitch.tv/helix/streams";

    pub fn new(client: Client, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let mut extractor = Extractor::new(Platform::Twitch, client.clone());
        extractor.add_header_str("Client-Id", &client_id);

        Self {
            extractor,
            tokens: Arc::new(TokenManager::new(client, client_id, client_secret)),
        }
    }

    /// Accepts a bare login or a channel URL.
    pub fn normalize_login(account_ref: &str) -> Result<String, DetectError> {
        let trimmed = account_ref.trim();
        let login = capture_group_1(&URL_REGEX, trimmed).unwrap_or(trimmed);
        if !LOGIN_REGEX.is_match(login) {
            return Err(DetectError::NotFound(format!("invalid twitch login '{account_ref}'")));
        }
        Ok(login.to_ascii_lowercase())
    }

    pub(crate) fn parse_streams(
        login: &str,
        body: &str,
        fetched_at: chrono::DateTime<Utc>,
    ) -> Result<DetectionResult, DetectError> {
        let response: HelixStreamsResponse = serde_json::from_str(body)?;

        let Some(stream) = response
            .data
            .into_iter()
            .find(|s| s.is_live() && (s.user_login.is_empty() || s.user_login.eq_ignore_ascii_case(login)))
        else {
            return Ok(DetectionResult::offline_at(Platform::Twitch, login, fetched_at));
        };

        let mut result = DetectionResult::live_at(Platform::Twitch, login, fetched_at)
            .with_session_hint(stream.id);
        if let Some(viewers) = stream.viewer_count {
            result = result.with_viewer_count(viewers);
        }
        if !stream.title.is_empty() {
            result = result.with_title(stream.title);
        }
        if let Some(started_at) = stream.started_at {
            result = result.with_started_at(started_at);
        }
        Ok(result)
    }
}

#[async_trait]
impl PlatformDetector for Twitch {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    async fn detect(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
        let login = Self::normalize_login(account_ref)?;
        let token = self.tokens.token().await?;

        let request = self
            .extractor
            .get(Self::STREAMS_URL)
            .bearer_auth(token)
            .query(&[("user_login", login.as_str())]);

        let body = match self.extractor.send_text(request).await {
            Ok(body) => body,
            Err(DetectError::AuthExpired(reason)) => {
                self.tokens.invalidate().await;
                return Err(DetectError::AuthExpired(reason));
            }
            Err(e) => return Err(e),
        };

        let result = Self::parse_streams(&login, &body, Utc::now())?;
        debug!(login = %login, is_live = result.is_live, "Twitch stream lookup");
        Ok(result)
    }

    async fn refresh_credentials(&self) -> Result<(), DetectError> {
        self.tokens.refresh().await
    }
}
