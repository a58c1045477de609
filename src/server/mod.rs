//! HTTP server for the control surface

pub mod http;

pub use http::{run, AppState};
