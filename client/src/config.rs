use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_RETRIES: u32 = 1;
pub const DEFAULT_PREFETCH_BATCH_SIZE: usize = 10;
pub const DEFAULT_PREFETCH_BATCH_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_COUNTRY_NAME: &str = "Uganda";

/// Session settings. `Default` matches the server's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Extra attempts after a retryable failure.
    pub retries: u32,
    pub prefetch_batch_size: usize,
    pub prefetch_batch_delay: Duration,
    /// Label of the root breadcrumb.
    pub country_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: DEFAULT_RETRIES,
            prefetch_batch_size: DEFAULT_PREFETCH_BATCH_SIZE,
            prefetch_batch_delay: DEFAULT_PREFETCH_BATCH_DELAY,
            country_name: DEFAULT_COUNTRY_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}
