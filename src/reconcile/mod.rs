//! Per-instance reconciliation
//!
//! A notification names one instance. The reconciler reads the instance and
//! its dialog, decides between skip, purge, soft delete, restore and upsert,
//! builds the dialog the instance calls for and merges it into the stored
//! one. Dialog ids are derived from the instance, so repeated delivery of
//! the same notification converges on the same dialog.

mod activities;
mod builder;
mod decision;
pub mod gui_actions;
mod merge;
mod reconciler;

pub use activities::{activities_from_events, transmissions_from_events};
pub use builder::{dialog_status, DialogBuilder};
pub use decision::{decide, SkipReason, SyncAction};
pub use merge::{form_saved_corrections, merge};
pub use reconciler::{DialogReconciler, SyncOutcome};
