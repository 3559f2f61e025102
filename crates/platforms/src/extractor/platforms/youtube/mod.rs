mod api;
mod models;
mod probe;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

pub use api::DataApiLookup;
pub use probe::{ChannelPageProbe, channel_page_classifier};

use crate::extractor::error::DetectError;
use crate::extractor::platform_extractor::PlatformDetector;
use crate::extractor::quota::{QuotaAwareResolver, ResolverConfig};
use crate::media::{DetectionResult, Platform};

/// YouTube detector: channel page probe first, Data API only on a hit.
pub struct YouTube {
    resolver: QuotaAwareResolver,
}

impl YouTube {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        probe_threshold: usize,
        config: ResolverConfig,
    ) -> Self {
        let probe = Arc::new(ChannelPageProbe::new(client.clone(), probe_threshold));
        let metered = Arc::new(DataApiLookup::new(client, api_key));
        Self {
            resolver: QuotaAwareResolver::new(Platform::YouTube, probe, metered, config),
        }
    }

    pub fn resolver(&self) -> &QuotaAwareResolver {
        &self.resolver
    }
}

#[async_trait]
impl PlatformDetector for YouTube {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn detect(&self, account_ref: &str) -> Result<DetectionResult, DetectError> {
        self.resolver.resolve(account_ref).await
    }
}
