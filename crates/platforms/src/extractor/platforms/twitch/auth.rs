//! App access tokens for the Helix API (client-credentials grant).

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::models::AppAccessToken;
use crate::extractor::error::DetectError;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Tokens are dropped this long before Twitch says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Caches one app access token and fetches a new one on demand.
///
/// Concurrent callers needing a fresh token wait on the same fetch.
#[derive(Debug)]
pub struct TokenManager {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(client: Client, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// A valid token, fetching one if the cache is empty or near expiry.
    pub async fn token(&self) -> Result<String, DetectError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.value.clone());
        }

        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    /// Forget the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        if self.token.lock().await.take().is_some() {
            debug!("Twitch app access token invalidated");
        }
    }

    /// Replace the cached token unconditionally.
    pub async fn refresh(&self) -> Result<(), DetectError> {
        let fresh = self.fetch().await?;
        *self.token.lock().await = Some(fresh);
        Ok(())
    }

    async fn fetch(&self) -> Result<CachedToken, DetectError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Bad client credentials come back as 400/403; both mean "fix the config".
            return Err(match status.as_u16() {
                400 | 401 | 403 => DetectError::AuthExpired(format!("token request rejected: HTTP {status}")),
                _ => DetectError::from_status(status, &body),
            });
        }

        let token: AppAccessToken = serde_json::from_str(&body)?;
        info!(expires_in = token.expires_in, "Fetched Twitch app access token");
        Ok(CachedToken {
            refresh_at: refresh_deadline(Instant::now(), token.expires_in),
            value: token.access_token,
        })
    }
}

fn refresh_deadline(now: Instant, expires_in: u64) -> Instant {
    now + Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN)
}
