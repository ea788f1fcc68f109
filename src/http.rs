//! Shared HTTP plumbing for the remote providers.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use thiserror::Error;

/// Errors from a remote provider call.
///
/// All variants mean "no usable data from this provider for this query"; the
/// resolver degrades the affected fields to `None` instead of failing.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport failure, timeout, or a response that could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status without a JSON body to hand back
    #[error("provider returned status {status}")]
    Status { status: u16 },

    /// Body was not the JSON shape we expect
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Structured `errors` payload from the provider
    #[error("provider error payload: {0}")]
    Payload(String),
}

/// Build the client shared by every provider, with a bounded per-request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("dive-conditions/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Send a request and return the raw body.
///
/// Non-success statuses still return the body when it parses as JSON, since
/// some providers report quota and auth failures as structured payloads.
pub async fn fetch_body(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() || serde_json::from_str::<serde_json::Value>(&body).is_ok() {
        Ok(body)
    } else {
        Err(ProviderError::Status {
            status: status.as_u16(),
        })
    }
}
