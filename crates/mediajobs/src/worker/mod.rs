pub mod dispatcher;
pub mod executor;
pub mod pool;
pub mod request;
pub mod runners;
pub mod transcoder;

pub use dispatcher::Dispatcher;
pub use executor::{RunContext, TaskExecutor};
pub use pool::{TaskSubmitter, WorkerPool};
pub use request::{ConversionRequest, QueuedTask, TaskHandle, TaskOutcome, UploadConfig};
pub use runners::{
    Attachment, AudioRunner, ImageRunner, MediaRunner, RunOutput, RunnerRegistry, VideoHlsRunner,
};
pub use transcoder::{StageRequest, Transcoder};
