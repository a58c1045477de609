//! HTTP routes for the control surface

pub mod control;
pub mod health;

pub use control::{
    handle_migrate, handle_pause, handle_pause_all, handle_paused, handle_resume,
    handle_resume_all, handle_sync, handle_truncate_partitions,
};
pub use health::{health_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::SyncError;

/// JSON response with `status`
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"error":"Serialization failed"}"#.to_vec());

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Error body, status taken from the error
pub fn error_response(err: &SyncError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    json_response(
        status,
        &serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": err.to_string(),
        }),
    )
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
        }),
    )
}
