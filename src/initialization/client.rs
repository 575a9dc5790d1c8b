//! HTTP client initialization.

use std::time::Duration;

use reqwest::ClientBuilder;

use crate::error_handling::InitializationError;

/// User-Agent sent on outbound calls.
const USER_AGENT: &str = concat!("http_attenuator/", env!("CARGO_PKG_VERSION"));

/// Initializes the HTTP client behind `ReqwestTransport`.
///
/// Redirects are not followed: a 3xx is the backend's answer and is handed to
/// the success predicates like any other status. `timeout` is a backstop; the
/// circuit breaker applies its own per-attempt timeout on top.
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` if the client cannot be built.
pub fn init_client(timeout: Duration) -> Result<reqwest::Client, InitializationError> {
    let client = ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}
