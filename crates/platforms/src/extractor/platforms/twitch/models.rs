use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub(crate) struct AppAccessToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct HelixStreamsResponse {
    #[serde(default)]
    pub data: Vec<HelixStream>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct HelixStream {
    pub id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default, rename = "type")]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    pub viewer_count: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl HelixStream {
    /// Helix lists reruns and premieres too; only `live` counts.
    pub fn is_live(&self) -> bool {
        self.stream_type.is_empty() || self.stream_type == "live"
    }
}
