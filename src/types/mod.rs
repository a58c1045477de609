//! Shared types

mod error;

pub use error::{ErrorClass, Result, SyncError};
