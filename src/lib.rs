//! dialog-sync - keeps dialogs in step with case-management instances
//!
//! Two operating modes share one reconciliation engine:
//!
//! ## Modes
//!
//! - **Live sync**: one discovery loop per organization tails the origin
//!   store's change listing and feeds a bounded pipeline of reconcilers
//! - **Migration**: a date range is split into (day, organization)
//!   partitions, each walked backwards with a persisted checkpoint so runs
//!   can resume after a crash
//!
//! ## Components
//!
//! - **Streamer**: paginated change listing as a resumable ordered stream
//! - **Live**: per-organization discovery feeding the pipeline
//! - **Pipeline**: bounded worker pool with per-organization pause gates
//! - **Migration**: partition scheduling, dispatch and the partition runner
//! - **Reconcile**: per-instance decision table and dialog merge

pub mod checkpoint;
pub mod clients;
pub mod config;
pub mod db;
pub mod live;
pub mod logging;
pub mod migration;
pub mod model;
pub mod nats;
pub mod pipeline;
pub mod reconcile;
pub mod routes;
pub mod server;
pub mod streamer;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ErrorClass, Result, SyncError};
