//! Per-kind conversion runners.
//!
//! A runner walks the job's stage plan, drives the transcoder for each
//! stage and imports what it produced into storage. Binding is left to the
//! executor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::TranscodeError;
use crate::jobs::MediaKind;

use super::executor::RunContext;
use super::transcoder::{StageRequest, Transcoder};

pub mod audio;
pub mod image;
pub mod video;

pub use audio::AudioRunner;
pub use image::ImageRunner;
pub use video::VideoHlsRunner;

/// Stage key that imports artifacts rather than running the codec.
pub const FINALIZE_STAGE: &str = "finalize";

/// A secondary artifact bound to another field of the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub field: String,
    pub relative_path: String,
}

/// Stored artifacts of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Relative path bound to the job's own field.
    pub primary: String,
    pub attachments: Vec<Attachment>,
}

impl RunOutput {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            attachments: Vec::new(),
        }
    }
}

pub trait MediaRunner: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn run(&self, ctx: &RunContext<'_>) -> Result<RunOutput, TranscodeError>;
}

/// Runners keyed by media kind.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<MediaKind, Arc<dyn MediaRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image, audio and HLS video runners over one transcoder.
    pub fn with_defaults(transcoder: Arc<dyn Transcoder>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImageRunner::new(Arc::clone(&transcoder))));
        registry.register(Arc::new(AudioRunner::new(Arc::clone(&transcoder))));
        registry.register(Arc::new(VideoHlsRunner::new(transcoder)));
        registry
    }

    /// Registers `runner` for its kind, replacing any previous one.
    pub fn register(&mut self, runner: Arc<dyn MediaRunner>) {
        self.runners.insert(runner.kind(), runner);
    }

    pub fn get(&self, kind: MediaKind) -> Option<Arc<dyn MediaRunner>> {
        self.runners.get(&kind).cloned()
    }
}

/// Runs one codec stage with progress forwarded to the ledger.
pub(crate) fn run_codec_stage(
    transcoder: &dyn Transcoder,
    ctx: &RunContext<'_>,
    stage: &str,
) -> Result<Vec<PathBuf>, TranscodeError> {
    ctx.ensure_target()?;
    ctx.ensure_current()?;
    ctx.enter_stage(stage);

    let request = StageRequest {
        kind: ctx.job().kind,
        stage,
        source: ctx.source_path(),
        work_dir: ctx.work_dir(),
    };
    let files = transcoder.run_stage(&request, &|fraction| ctx.report_stage_progress(fraction))?;
    if files.is_empty() {
        return Err(TranscodeError::NoOutput {
            stage: stage.to_string(),
        });
    }
    ctx.heartbeat();
    Ok(files)
}

/// Shared body of the image and audio runners: every non-finalize stage
/// runs the codec, and the finalize stage imports the last stage's files.
/// The first imported file is the primary output.
pub(crate) fn run_single_artifact(
    transcoder: &dyn Transcoder,
    ctx: &RunContext<'_>,
) -> Result<RunOutput, TranscodeError> {
    let mut produced: Vec<PathBuf> = Vec::new();
    let codec_stages: Vec<String> = ctx
        .plan()
        .iter()
        .filter(|e| e.key != FINALIZE_STAGE)
        .map(|e| e.key.clone())
        .collect();

    if codec_stages.is_empty() {
        produced = run_codec_stage(transcoder, ctx, "transcode")?;
    }
    for stage in &codec_stages {
        produced = run_codec_stage(transcoder, ctx, stage)?;
    }

    ctx.ensure_target()?;
    ctx.ensure_current()?;
    ctx.enter_stage(FINALIZE_STAGE);
    let mut primary = None;
    for file in &produced {
        let stored = ctx.import_artifact(file)?;
        primary.get_or_insert(stored);
    }
    ctx.report_stage_progress(1.0);

    primary.map(RunOutput::new).ok_or_else(|| TranscodeError::NoOutput {
        stage: FINALIZE_STAGE.to_string(),
    })
}
