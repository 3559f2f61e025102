use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use thiserror::Error;

/// Returned when a platform name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown platform '{0}'")]
pub struct UnknownPlatform(pub String);

/// Streaming platforms with a detector implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    YouTube,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Twitch, Platform::YouTube, Platform::TikTok];

    /// Database / config string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::YouTube => "youtube",
            Self::TikTok => "tiktok",
        }
    }

    /// Public channel URL for an account on this platform.
    pub fn channel_url(&self, account_ref: &str) -> String {
        match self {
            Self::Twitch => format!("https://www.twitch.tv/{account_ref}"),
            Self::YouTube => format!("https://www.youtube.com/@{}", account_ref.trim_start_matches('@')),
            Self::TikTok => format!("https://www.tiktok.com/@{}", account_ref.trim_start_matches('@')),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" => Ok(Self::Twitch),
            "youtube" => Ok(Self::YouTube),
            "tiktok" => Ok(Self::TikTok),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}
