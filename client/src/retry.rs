use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ClientError, Result};

/// Run `attempt` under `timeout`, retrying up to `retries` more times while
/// the failure is retryable. An elapsed timeout becomes
/// [`ClientError::Timeout`].
pub async fn with_retry<T, F, Fut>(
    label: &str,
    timeout: Duration,
    retries: u32,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = retries;
    loop {
        let outcome = match tokio::time::timeout(timeout, attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Timeout {
                millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        match outcome {
            Err(e) if remaining > 0 && e.is_retryable() => {
                remaining -= 1;
                debug!(label, error = %e, "retrying request");
            }
            other => return other,
        }
    }
}
