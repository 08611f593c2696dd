use std::future::Future;
use std::time::Duration;

use warden_drive::GatewayError;

/// Bounded exponential backoff for rate-limited gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base: Duration,
    /// Upper bound on any single delay, including a provider `Retry-After`.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.cap);
        }
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

/// Result of an operation run under [`retry_rate_limited`].
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, GatewayError>,
    /// Total calls made, including the first.
    pub attempts: u32,
}

/// Run `f`, retrying only on rate-limit errors until `policy` is exhausted.
///
/// Any other error is returned immediately. When retries run out the last
/// rate-limit error is returned.
pub async fn retry_rate_limited<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut f: F,
) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        let result = f().await;
        let attempts = attempt + 1;
        match result {
            Err(e) if e.is_rate_limited() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt, e.retry_after());
                tracing::warn!(
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "{operation} rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return Retried { result, attempts },
        }
    }
}
