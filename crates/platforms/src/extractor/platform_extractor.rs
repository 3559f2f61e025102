use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::default::DEFAULT_UA;
use super::error::DetectError;
use crate::media::{DetectionResult, Platform};

/// Shared HTTP plumbing for detectors.
///
/// Holds the per-platform default headers and query parameters and turns
/// non-success responses into classified [`DetectError`]s.
#[derive(Debug, Clone)]
pub struct Extractor {
    pub platform: Platform,
    pub client: Client,
    platform_headers: HeaderMap,
    platform_params: FxHashMap<String, String>,
}

impl Extractor {
    pub fn new(platform: Platform, client: Client) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_UA),
        );
        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        Self {
            platform,
            client,
            platform_headers: default_headers,
            platform_params: FxHashMap::default(),
        }
    }

    pub fn add_header_owned<K: Into<HeaderName>, V: Into<HeaderValue>>(
        &mut self,
        key: K,
        value: V,
    ) {
        self.platform_headers.insert(key.into(), value.into());
    }

    pub fn add_header_str<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderName::from_str(key.as_ref()) {
            Ok(name) => match HeaderValue::from_str(value.as_ref()) {
                Ok(value) => {
                    self.platform_headers.insert(name, value);
                }
                Err(e) => {
                    debug!(error = %e, "Invalid header value; skipping");
                }
            },
            Err(e) => {
                debug!(error = %e, "Invalid header name; skipping");
            }
        }
    }

    pub fn add_param<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.platform_params.insert(key.into(), value.into());
    }

    pub fn get_platform_headers(&self) -> &HeaderMap {
        &self.platform_headers
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Build a request carrying the platform headers and default query params.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .headers(self.platform_headers.clone());

        if self.platform_params.is_empty() {
            builder
        } else {
            builder.query(&self.platform_params)
        }
    }

    /// Send `request` and return the body, classifying any non-2xx status.
    pub async fn send_text(&self, request: RequestBuilder) -> Result<String, DetectError> {
        let response = request.send().await?;
        Self::read_text(response).await
    }

    /// Send `request` and decode a JSON body.
    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DetectError> {
        let body = self.send_text(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn read_text(response: Response) -> Result<String, DetectError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(%status, body_len = body.len(), "Upstream returned an error status");
            return Err(DetectError::from_status(status, &body));
        }
        Ok(body)
    }
}

/// A live-status detector for one platform.
///
/// Implementations must be cheap to share across tasks; the scheduler calls
/// `detect` concurrently for different accounts on the same instance.
#[async_trait]
pub trait PlatformDetector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Check whether `account_ref` is broadcasting right now.
    async fn detect(&self, account_ref: &str) -> Result<DetectionResult, DetectError>;

    /// Drop and re-acquire any credentials this detector holds.
    ///
    /// Called after `detect` returned [`DetectError::AuthExpired`]. Detectors
    /// without credentials keep the default no-op.
    async fn refresh_credentials(&self) -> Result<(), DetectError> {
        Ok(())
    }
}
