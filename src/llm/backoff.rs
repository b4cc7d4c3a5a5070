use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ServiceError;

/// Bounded retry policy for transient collaborator failures. Distinct from
/// the SOAP content-correction retry, which is about grounding, not
/// availability.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Extra attempts after the first call.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub initial_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Non-transient errors (auth, malformed payloads, 4xx other than 429) are
/// returned immediately.
pub async fn with_backoff<T, F, Fut>(config: &BackoffConfig, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.initial_delay * 2u32.pow(attempt);
                warn!(
                    "transient collaborator failure (attempt {} of {}), retrying in {:?}: {}",
                    attempt + 1,
                    config.max_retries + 1,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
