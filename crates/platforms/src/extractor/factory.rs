use std::collections::BTreeMap;
use std::sync::Arc;

use super::platform_extractor::PlatformDetector;
use crate::media::Platform;

/// Detectors keyed by the platform they serve.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: BTreeMap<Platform, Arc<dyn PlatformDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector under its own [`PlatformDetector::platform`],
    /// replacing any previous detector for that platform.
    pub fn register(&mut self, detector: Arc<dyn PlatformDetector>) -> &mut Self {
        self.detectors.insert(detector.platform(), detector);
        self
    }

    pub fn with(mut self, detector: Arc<dyn PlatformDetector>) -> Self {
        self.register(detector);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformDetector>> {
        self.detectors.get(&platform).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.detectors.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("platforms", &self.detectors.keys().collect::<Vec<_>>())
            .finish()
    }
}
