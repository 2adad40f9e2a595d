//! Bounded retries for adapter calls.

use std::future::Future;
use tracing::warn;
use unblock_core::AdapterConfig;
use crate::collaborators::AdapterError;

/// Run `call` until it succeeds, fails permanently, or runs out of attempts.
///
/// Each attempt is bounded by the policy's timeout; failed attempts are
/// followed by an exponentially growing delay.
pub async fn with_retry<T, F, Fut>(policy: &AdapterConfig, operation: &str, mut call: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(policy.timeout())),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt >= attempts => {
                warn!(operation, attempt, error = %e, "Adapter call failed");
                return Err(e);
            }
            Err(e) => {
                warn!(operation, attempt, error = %e, "Adapter call failed, retrying");
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
        }
    }
}
