use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Default per-request timeout for detector HTTP calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the process-wide rustls crypto provider.
///
/// reqwest is built without a bundled provider, so this must run before the
/// first client is constructed. Repeated calls are no-ops.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Err means another provider was installed first, which is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// A client builder preconfigured for scraping and API calls.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    install_crypto_provider();

    Client::builder()
        .user_agent(DEFAULT_UA)
        .timeout(timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .deflate(true)
}

pub fn default_client() -> Result<Client, reqwest::Error> {
    create_client_builder(None).build()
}
