//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo. One task per connection; routing is a
//! plain match on method and path.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::migration::MigrationScheduler;
use crate::model::SyncNotification;
use crate::pipeline::{PauseRegistry, PipelineStats, Publisher};
use crate::routes;
use crate::types::Result;

/// Shared state handed to every request
pub struct AppState {
    pub args: Args,
    pub started_at: Instant,
    pub pauses: PauseRegistry,
    /// Front of the reconciliation pipeline
    pub publisher: Publisher<SyncNotification>,
    pub stats: Arc<PipelineStats>,
    pub scheduler: Arc<MigrationScheduler>,
}

impl AppState {
    pub fn new(
        args: Args,
        pauses: PauseRegistry,
        publisher: Publisher<SyncNotification>,
        stats: Arc<PipelineStats>,
        scheduler: Arc<MigrationScheduler>,
    ) -> Self {
        Self {
            args,
            started_at: Instant::now(),
            pauses,
            publisher,
            stats,
            scheduler,
        }
    }
}

/// Serve the control surface until `cancel` fires
pub async fn run(state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "dialog-sync listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory fallbacks allowed");
    }

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Control surface shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    debug!("[{}] {} {}", addr, req.method(), req.uri().path());
    Ok(route(state, req).await)
}

/// Dispatch a request to its handler
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        (Method::GET, "/version") => routes::version_info(),

        (Method::GET, "/api/v1/pause") => routes::handle_paused(state),
        (Method::POST, "/api/v1/pause") => routes::handle_pause_all(state).await,
        (Method::POST, "/api/v1/resume") => routes::handle_resume_all(state),
        (Method::POST, p) if p.starts_with("/api/v1/pause/") => {
            routes::handle_pause(state, scope_segment(p, "/api/v1/pause/")).await
        }
        (Method::POST, p) if p.starts_with("/api/v1/resume/") => {
            routes::handle_resume(state, scope_segment(p, "/api/v1/resume/"))
        }

        (Method::POST, "/api/v1/migrations") => routes::handle_migrate(state, req).await,
        (Method::DELETE, "/api/v1/migrations/partitions") => {
            routes::handle_truncate_partitions(state).await
        }

        (Method::POST, "/api/v1/sync") => routes::handle_sync(state, req).await,

        _ => routes::not_found_response(&path),
    }
}

fn scope_segment<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or("").trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_segment() {
        assert_eq!(scope_segment("/api/v1/pause/ttd", "/api/v1/pause/"), "ttd");
        assert_eq!(scope_segment("/api/v1/pause/ttd/", "/api/v1/pause/"), "ttd");
        assert_eq!(scope_segment("/api/v1/pause/", "/api/v1/pause/"), "");
    }
}
