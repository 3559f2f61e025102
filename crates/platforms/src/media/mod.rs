pub mod detection;
pub mod platform;

pub use detection::DetectionResult;
pub use platform::{Platform, UnknownPlatform};
