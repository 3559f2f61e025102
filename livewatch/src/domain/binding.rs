use std::fmt;

use live_platforms::Platform;
use serde::{Deserialize, Serialize};

/// Polling cadence class of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Polled every base interval.
    Karma,
    /// Polled every `slow_tier_multiplier` base intervals.
    #[default]
    Regular,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Karma => "karma",
            Self::Regular => "regular",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "karma" => Some(Self::Karma),
            "regular" => Some(Self::Regular),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a binding: one creator on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    pub creator_id: String,
    pub platform: Platform,
}

impl BindingKey {
    pub fn new(creator_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            creator_id: creator_id.into(),
            platform,
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.creator_id, self.platform)
    }
}

/// A creator's account on one platform, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub creator_id: String,
    pub platform: Platform,
    pub account_ref: String,
    pub tier: Tier,
}

impl Binding {
    pub fn new(
        creator_id: impl Into<String>,
        platform: Platform,
        account_ref: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            creator_id: creator_id.into(),
            platform,
            account_ref: account_ref.into(),
            tier,
        }
    }

    pub fn key(&self) -> BindingKey {
        BindingKey::new(self.creator_id.clone(), self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!(Tier::parse("karma"), Some(Tier::Karma));
        assert_eq!(Tier::parse(Tier::Regular.as_str()), Some(Tier::Regular));
        assert_eq!(Tier::parse("gold"), None);
    }

    #[test]
    fn test_binding_key_display() {
        let binding = Binding::new("c1", Platform::Twitch, "someone", Tier::Karma);
        assert_eq!(binding.key().to_string(), "c1/twitch");
    }
}
