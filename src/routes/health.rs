//! Health and version endpoints
//!
//! `/health` and `/healthz` report liveness only. They never probe the
//! origin store, the dialog service, MongoDB or NATS.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the control surface started
    pub uptime: u64,
    pub timestamp: String,
    /// `development` or `production`
    pub mode: &'static str,
    pub node_id: String,
    pub live_sync: bool,
    pub pipeline: PipelineHealth,
    pub paused_scopes: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineHealth {
    pub handled: u64,
    pub failed: u64,
    pub parked: u64,
    /// Free queue slots
    pub available: usize,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let (handled, failed, parked) = state.stats.snapshot();

    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        live_sync: state.args.live_sync_enabled,
        pipeline: PipelineHealth {
            handled,
            failed,
            parked,
            available: state.publisher.available(),
        },
        paused_scopes: state.pauses.paused_scopes().len(),
    }
}

/// Liveness probe, always 200 while the process serves requests
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_commit_full: &'static str,
    pub build_time: &'static str,
}

/// Build stamp for deployment verification
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionInfo {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: env!("GIT_COMMIT_SHORT"),
            git_commit_full: env!("GIT_COMMIT_FULL"),
            build_time: env!("BUILD_TIMESTAMP"),
        },
    )
}
