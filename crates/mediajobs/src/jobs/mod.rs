//! Job records: the data model, the ledger that owns them and the event
//! stream published on every write.

pub mod events;
pub mod ledger;
pub mod model;

pub use events::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use ledger::{merge_update, JobLedger, UpsertJob, DEFAULT_MAX_ATTEMPTS};
pub use model::{Job, JobStatus, JobUpdate, MediaKind, StagePlanEntry, TargetRef};
