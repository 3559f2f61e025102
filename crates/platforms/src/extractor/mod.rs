pub mod classifier;
pub mod default;
pub mod error;
pub mod factory;
pub mod platform_extractor;
pub mod platforms;
pub mod quota;
pub mod utils;

pub use default::{create_client_builder, default_client, install_crypto_provider};
