use std::sync::Arc;

use reqwest::Client;

use super::factory::DetectorRegistry;
use super::quota::ResolverConfig;

pub mod tiktok;
pub mod twitch;
pub mod youtube;

/// Credentials and tuning for the built-in detectors.
///
/// A platform whose credentials are missing is left out of the registry.
#[derive(Debug, Clone, Default)]
pub struct DetectorSettings {
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    pub youtube_api_key: Option<String>,
    pub classifier_threshold: usize,
    pub resolver: ResolverConfig,
}

/// Returns a registry populated with every platform `settings` can support.
pub fn default_registry(client: Client, settings: &DetectorSettings) -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();

    if let (Some(id), Some(secret)) = (&settings.twitch_client_id, &settings.twitch_client_secret) {
        registry.register(Arc::new(twitch::Twitch::new(client.clone(), id, secret)));
    }

    if let Some(key) = &settings.youtube_api_key {
        registry.register(Arc::new(youtube::YouTube::new(
            client.clone(),
            key,
            settings.classifier_threshold,
            settings.resolver.clone(),
        )));
    }

    registry.register(Arc::new(tiktok::TikTok::new(
        client,
        settings.classifier_threshold,
    )));

    registry
}
