//! What to do with a dialog given the state of its instance

use crate::model::{Dialog, Instance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing to write
    Skip(SkipReason),
    /// Irrecoverable delete of the dialog
    Purge,
    /// Soft delete of the dialog
    SoftDelete,
    /// Build the dialog and create or update it, restoring it first when set
    Upsert { restore: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a live instance nor a dialog exists
    NothingToReconcile,
    /// Instance and dialog are both soft deleted
    AlreadyDeleted,
}

/// First matching row wins:
///
/// | instance              | dialog          | action          |
/// |-----------------------|-----------------|-----------------|
/// | absent / hard deleted | absent          | skip            |
/// | absent / hard deleted | present         | purge           |
/// | soft deleted          | deleted         | skip            |
/// | soft deleted          | present         | soft delete     |
/// | live                  | deleted         | restore, upsert |
/// | otherwise             |                 | upsert          |
pub fn decide(instance: Option<&Instance>, dialog: Option<&Dialog>) -> SyncAction {
    let instance = instance.filter(|i| !i.is_hard_deleted());

    match (instance, dialog) {
        (None, None) => SyncAction::Skip(SkipReason::NothingToReconcile),
        (None, Some(_)) => SyncAction::Purge,
        (Some(i), Some(d)) if i.is_soft_deleted() && d.is_deleted() => {
            SyncAction::Skip(SkipReason::AlreadyDeleted)
        }
        (Some(i), Some(_)) if i.is_soft_deleted() => SyncAction::SoftDelete,
        (Some(_), Some(d)) if d.is_deleted() => SyncAction::Upsert { restore: true },
        (Some(_), _) => SyncAction::Upsert { restore: false },
    }
}
