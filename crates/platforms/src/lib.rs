//! Live-status detection for streaming platforms.
//!
//! Each supported platform is exposed through the [`PlatformDetector`] trait,
//! which turns an account reference into a [`DetectionResult`] or a classified
//! [`DetectError`]. Detectors are grouped in a [`DetectorRegistry`] keyed by
//! [`Platform`].
//!
//! Two reusable strategies live next to the adapters:
//! - [`extractor::classifier`]: threshold voting over independent live indicators
//! - [`extractor::quota`]: two-phase detection that guards a metered API behind
//!   an unmetered probe

pub mod extractor;
pub mod media;

pub use extractor::error::{DetectError, ErrorKind};
pub use extractor::factory::DetectorRegistry;
pub use extractor::platform_extractor::PlatformDetector;
pub use media::{DetectionResult, Platform};
pub use extractor::platforms::{DetectorSettings, default_registry};
pub use extractor::quota::ResolverConfig;
pub use extractor::default_client;
