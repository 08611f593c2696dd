//! Shared HTTP client construction and response header helpers.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Create the HTTP client used by [`crate::DriveClient`].
///
/// rustls TLS, `warden/{version}` user-agent, redirect limit 10.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialised (unreachable in practice).
#[must_use]
pub fn build_client(connect_timeout: Duration, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}

/// Client with a 30s connect timeout and a 60s request timeout.
#[must_use]
pub fn default_client() -> reqwest::Client {
    build_client(Duration::from_secs(30), Duration::from_secs(60))
}

/// Parse a delta-seconds `Retry-After` header.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
