//! HTTP clients for the identity and movement collaborators.

mod prison_api;
mod prisoner_search;

pub use prison_api::PrisonApiClient;
pub use prisoner_search::PrisonerSearchClient;

use std::time::Duration;

use thiserror::Error;

/// Errors talking to a collaborator. All are treated as transient by callers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
}

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Fails with [`ClientError::Status`] unless the response succeeded.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(service, status = %status, body = %body, "Collaborator request failed");
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
