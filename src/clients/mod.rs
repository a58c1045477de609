//! Upstream service clients
//!
//! Each collaborator sits behind a narrow trait so the engine can run
//! against the real HTTP services or in-memory fakes.

pub mod dialogs;
pub mod memory;
pub mod organizations;
pub mod origin;

use std::time::Duration;

use crate::types::{Result, SyncError};

pub use dialogs::{DialogService, HttpDialogService, WriteOptions};
pub use memory::{sample_application, DialogWrite, InMemoryDialogService, InMemoryOriginStore};
pub use organizations::{OrganizationCache, OrganizationSnapshot};
pub use origin::{HttpOriginStore, InstancePage, InstanceQuery, OriginStore, MAX_PAGE_SIZE};

/// Shared reqwest client construction
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("dialog-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Transport level failure: never reached the service or no answer in time
pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> SyncError {
    SyncError::Transient {
        service,
        message: err.to_string(),
    }
}

/// Turn a non-2xx answer into a classified error
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::from_status(service, status.as_u16(), body))
}

/// Check the status and decode a JSON body. Malformed payloads are permanent.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let bytes = ensure_success(service, response)
        .await?
        .bytes()
        .await
        .map_err(|e| transport_error(service, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SyncError::BadRequest(format!("{} returned a malformed payload: {}", service, e)))
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
