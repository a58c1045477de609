//! Operator endpoints: pause gates, migrations, manual sync
//!
//! Handlers are generic over the request body so they can be driven with an
//! in-memory body in tests.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, json_response};
use crate::migration::MigrationCommand;
use crate::model::SyncNotification;
use crate::server::AppState;
use crate::types::SyncError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeChange<'a> {
    scope: &'a str,
    changed: bool,
    paused: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkChange {
    changed: usize,
    paused_scopes: Vec<String>,
}

/// POST /api/v1/pause
pub async fn handle_pause_all(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let changed = state.pauses.pause_all().await;
    info!(changed, "Paused all scopes");
    json_response(
        StatusCode::OK,
        &BulkChange {
            changed,
            paused_scopes: state.pauses.paused_scopes(),
        },
    )
}

/// POST /api/v1/resume
pub fn handle_resume_all(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let changed = state.pauses.resume_all();
    info!(changed, "Resumed all scopes");
    json_response(
        StatusCode::OK,
        &BulkChange {
            changed,
            paused_scopes: state.pauses.paused_scopes(),
        },
    )
}

/// POST /api/v1/pause/{org}
pub async fn handle_pause(state: Arc<AppState>, org: &str) -> Response<Full<Bytes>> {
    if org.is_empty() {
        return error_response(&SyncError::BadRequest("Missing organization".into()));
    }
    let changed = state.pauses.pause(org).await;
    info!(org, changed, "Paused scope");
    json_response(
        StatusCode::OK,
        &ScopeChange {
            scope: org,
            changed,
            paused: true,
        },
    )
}

/// POST /api/v1/resume/{org}
pub fn handle_resume(state: Arc<AppState>, org: &str) -> Response<Full<Bytes>> {
    if org.is_empty() {
        return error_response(&SyncError::BadRequest("Missing organization".into()));
    }
    let changed = state.pauses.resume(org);
    info!(org, changed, "Resumed scope");
    json_response(
        StatusCode::OK,
        &ScopeChange {
            scope: org,
            changed,
            paused: false,
        },
    )
}

/// GET /api/v1/pause
pub fn handle_paused(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "pausedScopes": state.pauses.paused_scopes() }),
    )
}

/// POST /api/v1/migrations
pub async fn handle_migrate<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let command: MigrationCommand = match read_json(req).await {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.scheduler.migrate(command).await {
        Ok(plan) => {
            let status = if plan.dry_run {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            json_response(status, &plan)
        }
        Err(e) => {
            warn!(error = %e, "Migration request failed");
            error_response(&e)
        }
    }
}

/// DELETE /api/v1/migrations/partitions
pub async fn handle_truncate_partitions(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.scheduler.truncate().await {
        Ok(removed) => json_response(StatusCode::OK, &serde_json::json!({ "removed": removed })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/sync
pub async fn handle_sync<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let notification: SyncNotification = match read_json(req).await {
        Ok(n) => n,
        Err(e) => return error_response(&e),
    };

    let instance_id = notification.instance_id;
    match state.publisher.publish(notification).await {
        Ok(()) => json_response(
            StatusCode::ACCEPTED,
            &serde_json::json!({ "instanceId": instance_id }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, SyncError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| SyncError::BadRequest(format!("Invalid body: {}", e)))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| SyncError::BadRequest(format!("Invalid JSON: {}", e)))
}
