use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;

/// Retry budget for idempotent reads (charge lookups, subscription search).
/// Writes are never routed through here.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDirective {
    Done,
    Retry,
}

/// Transport failures and 5xx answers are worth one more try; 4xx never is.
pub fn classify(err: &GatewayError) -> RetryDirective {
    match err.http_status {
        None => RetryDirective::Retry,
        Some(status) if status >= 500 => RetryDirective::Retry,
        Some(_) => RetryDirective::Done,
    }
}

pub fn attempt_limit(policy: &ReadRetryPolicy) -> u32 {
    policy.max_attempts.max(1)
}

pub async fn with_read_retry<T, F, Fut>(
    policy: &ReadRetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let limit = attempt_limit(policy);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < limit && classify(&err) == RetryDirective::Retry => {
                tracing::warn!(
                    operation,
                    attempt,
                    http_status = ?err.http_status,
                    error = %err,
                    "gateway read failed, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
