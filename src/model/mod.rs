//! Domain model
//!
//! Origin-store records, the dialog aggregate, change notifications and
//! migration partitions.

mod actor;
mod change;
mod dialog;
pub mod ids;
mod instance;
mod partition;

pub use actor::Actor;
pub use change::{ChangeRecord, SyncNotification};
pub use dialog::{
    Activity, ActivityType, ActorRef, ActorType, Attachment, AttachmentUrl, ContentValue, Dialog,
    DialogContent, DialogStatus, GuiAction, GuiActionPriority, Localization, Transmission,
    TransmissionType,
};
pub use instance::{
    Application, ApplicationRef, DataElement, DataType, Instance, InstanceEvent,
    InstanceEventType, InstanceOwner, InstanceStatus, PlatformUser, ProcessElement, ProcessState,
    Substatus, DIALOG_ID_KEY,
};
pub use partition::{Partition, PartitionCheckpoint};
