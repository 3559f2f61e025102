use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::models::{ChannelsResponse, SearchResponse, VideosResponse};
use crate::extractor::error::DetectError;
use crate::extractor::platform_extractor::Extractor;
use crate::extractor::quota::MeteredLookup;
use crate::media::{DetectionResult, Platform};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API v3 lookups. Every call here spends quota.
pub struct DataApiLookup {
    extractor: Extractor,
    channel_ids: Mutex<FxHashMap<String, String>>,
}

impl DataApiLookup {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        let mut extractor = Extractor::new(Platform::YouTube, client);
        extractor.add_param("key", api_key);
        Self {
            extractor,
            channel_ids: Mutex::new(FxHashMap::default()),
        }
    }

    fn is_channel_id(account_ref: &str) -> bool {
        account_ref.starts_with("UC") && account_ref.len() == 24
    }

    /// Channel id for a handle or legacy username, cached for the process lifetime.
    pub async fn resolve_channel_id(&self, account_ref: &str) -> Result<String, DetectError> {
        let name = account_ref.trim().trim_start_matches('@');
        if Self::is_channel_id(name) {
            return Ok(name.to_string());
        }
        if let Some(id) = self.channel_ids.lock().get(name) {
            return Ok(id.clone());
        }

        let handle = format!("@{name}");
        let url = format!("{API_BASE}/channels");
        for (key, value) in [("forHandle", handle.as_str()), ("forUsername", name)] {
            let request = self
                .extractor
                .get(&url)
                .query(&[("part", "id"), (key, value)]);
            let response: ChannelsResponse = self.extractor.send_json(request).await?;
            if let Some(item) = response.items.into_iter().next() {
                debug!(account = name, channel_id = %item.id, via = key, "Resolved YouTube channel");
                self.channel_ids
                    .lock()
                    .insert(name.to_string(), item.id.clone());
                return Ok(item.id);
            }
        }

        Err(DetectError::NotFound(format!("youtube channel '{account_ref}'")))
    }

    /// Id and title of the channel's current live broadcast, if any.
    async fn search_live(&self, channel_id: &str) -> Result<Option<(String, String)>, DetectError> {
        let request = self.extractor.get(&format!("{API_BASE}/search")).query(&[
            ("part", "snippet"),
            ("channelId", channel_id),
            ("eventType", "live"),
            ("type", "video"),
        ]);
        let body = self.extractor.send_text(request).await?;
        parse_search(&body)
    }

    async fn video_details(&self, video_id: &str) -> Result<VideosResponse, DetectError> {
        let request = self
            .extractor
            .get(&format!("{API_BASE}/videos"))
            .query(&[("part", "snippet,liveStreamingDetails"), ("id", video_id)]);
        self.extractor.send_json(request).await
    }
}

pub(crate) fn parse_search(body: &str) -> Result<Option<(String, String)>, DetectError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.items.into_iter().find_map(|item| {
        let snippet = item.snippet.unwrap_or_default();
        if !snippet.live_broadcast_content.is_empty() && snippet.live_broadcast_content != "live" {
            return None;
        }
        item.id.video_id.map(|id| (id, snippet.title))
    }))
}

pub(crate) fn build_live_result(
    account_ref: &str,
    video_id: String,
    search_title: String,
    details: Option<VideosResponse>,
    fetched_at: DateTime<Utc>,
) -> DetectionResult {
    let mut result =
        DetectionResult::live_at(Platform::YouTube, account_ref, fetched_at).with_session_hint(video_id);

    let item = details.and_then(|d| d.items.into_iter().next());
    let detail_title = item
        .as_ref()
        .and_then(|i| i.snippet.as_ref())
        .map(|s| s.title.clone())
        .filter(|t| !t.is_empty());

    if let Some(title) = detail_title.or(Some(search_title).filter(|t| !t.is_empty())) {
        result = result.with_title(title);
    }

    if let Some(live) = item.and_then(|i| i.live_streaming_details) {
        if let Some(viewers) = live
            .concurrent_viewers
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
        {
            result = result.with_viewer_count(viewers);
        }
        if let Some(started) = live.actual_start_time {
            result = result.with_started_at(started);
        }
    }
    result
}

#[async_trait]
impl MeteredLookup for DataApiLookup {
    async fn lookup(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
        let fetched_at = Utc::now();
        let channel_id = self.resolve_channel_id(account_ref).await?;

        let Some((video_id, title)) = self.search_live(&channel_id).await? else {
            return Ok(DetectionResult::offline_at(Platform::YouTube, account_ref, fetched_at));
        };

        // Metadata only; the search already confirmed the broadcast.
        let details = match self.video_details(&video_id).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "Failed to fetch YouTube video details");
                None
            }
        };

        if let Some(ended) = details
            .as_ref()
            .and_then(|d| d.items.first())
            .and_then(|i| i.live_streaming_details.as_ref())
            .and_then(|l| l.actual_end_time)
        {
            debug!(video_id = %video_id, %ended, "Search returned an already ended broadcast");
            return Ok(DetectionResult::offline_at(Platform::YouTube, account_ref, fetched_at));
        }

        Ok(build_live_result(account_ref, video_id, title, details, fetched_at))
    }
}
