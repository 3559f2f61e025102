use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub(crate) struct ChannelsResponse {
    #[serde(default)]
    pub items: Vec<ChannelItem>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ChannelItem {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchItem {
    pub id: SearchItemId,
    pub snippet: Option<Snippet>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct SearchItemId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "liveBroadcastContent", default)]
    pub live_broadcast_content: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct VideoItem {
    pub snippet: Option<Snippet>,
    #[serde(rename = "liveStreamingDetails")]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct LiveStreamingDetails {
    #[serde(rename = "actualStartTime")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(rename = "actualEndTime")]
    pub actual_end_time: Option<DateTime<Utc>>,
    /// Sent as a decimal string.
    #[serde(rename = "concurrentViewers")]
    pub concurrent_viewers: Option<String>,
}
