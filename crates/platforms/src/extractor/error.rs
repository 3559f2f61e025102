use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Classified failure of a single detection attempt.
///
/// Every failure a detector can produce maps onto exactly one of these kinds,
/// so callers can decide between "could not check" and "configuration problem"
/// without inspecting messages.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("credentials expired: {0}")]
    AuthExpired(String),
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Fieldless view of [`DetectError`] for logging, metrics and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransientNetwork,
    RateLimited,
    AuthExpired,
    NotFound,
    MalformedResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::RateLimited => "rate_limited",
            Self::AuthExpired => "auth_expired",
            Self::NotFound => "not_found",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AuthExpired(_) => ErrorKind::AuthExpired,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Classify a non-success HTTP status.
    ///
    /// `body` is only inspected to tell a quota rejection (403 with
    /// `quotaExceeded` / `rateLimitExceeded`) apart from an authorization failure.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthExpired(format!("HTTP {status}")),
            StatusCode::FORBIDDEN if is_quota_body(body) => Self::RateLimited { retry_after: None },
            StatusCode::FORBIDDEN => Self::AuthExpired(format!("HTTP {status}")),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after: None },
            StatusCode::NOT_FOUND | StatusCode::GONE => Self::NotFound(format!("HTTP {status}")),
            s if s.is_server_error() => Self::TransientNetwork(format!("HTTP {status}")),
            StatusCode::REQUEST_TIMEOUT => Self::TransientNetwork(format!("HTTP {status}")),
            _ => Self::MalformedResponse(format!("unexpected HTTP {status}")),
        }
    }

    /// Whether the upstream asked us to back off.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

fn is_quota_body(body: &str) -> bool {
    body.contains("quotaExceeded")
        || body.contains("rateLimitExceeded")
        || body.contains("dailyLimitExceeded")
}

impl From<reqwest::Error> for DetectError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, "");
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        // Timeouts, connect failures, resets and body read errors are all worth retrying.
        Self::TransientNetwork(err.to_string())
    }
}

impl From<serde_json::Error> for DetectError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}
