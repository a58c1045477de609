//! Delivery pipeline
//!
//! A bounded queue drained by a fixed pool of consumers, with per-scope
//! pause gates between discovery and the queue.

mod bounded;
mod forwarder;
mod pause;
mod retry;

pub use bounded::{
    BoundedPipeline, DeadLetterSink, FailureMode, ItemHandler, PipelineConfig, PipelineStats,
    Publisher,
};
pub use forwarder::ScopedForwarder;
pub use pause::{GateLease, PauseRegistry};
pub use retry::{run_with_retry, RetryDecision, RetryPolicy};
