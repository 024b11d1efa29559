pub mod availability;
pub mod binder;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod progress;
pub mod readiness;
pub mod reaper;
pub mod sanitize;
pub mod status;
pub mod storage;
pub mod worker;

pub use availability::{
    AvailabilityHook, AvailabilityTrigger, CommitScope, ConversionTarget, ConvertedFlag,
    MediaConvertedHook, TargetRegistry, TriggerOutcome,
};
pub use binder::{BindOutcome, OutputBinder};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, MediaJobsError, Result, StorageError, TargetError, TranscodeError, WorkerError,
};
pub use jobs::{
    Job, JobEvent, JobEventBroadcaster, JobLedger, JobStatus, JobUpdate, MediaKind,
    StagePlanEntry, TargetRef, UpsertJob,
};
pub use readiness::{get_readiness, get_strict_readiness, Readiness, ReadinessOptions, ReadinessStatus};
pub use reaper::{sweep_stale_jobs, StaleJobReaper};
pub use status::{list_job_status, JobStatusQuery, JobStatusView};
pub use storage::{FileSystemStorage, MediaStorage};
pub use worker::{
    ConversionRequest, Dispatcher, MediaRunner, RunContext, RunnerRegistry, TaskExecutor,
    TaskHandle, Transcoder, WorkerPool,
};
