//! The codec boundary.
//!
//! The pipeline never transforms media itself; a `Transcoder` does, one
//! stage at a time, writing files into a scratch directory.

use std::path::{Path, PathBuf};

use crate::error::TranscodeError;
use crate::jobs::MediaKind;

/// One stage of work handed to the codec.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub kind: MediaKind,
    /// Stage key from the plan, e.g. `video_720`, or `thumbnail`.
    pub stage: &'a str,
    pub source: &'a Path,
    /// Scratch directory shared by all stages of one run.
    pub work_dir: &'a Path,
}

pub trait Transcoder: Send + Sync {
    /// Runs one stage and returns the files it wrote into `work_dir`.
    ///
    /// `progress` receives the completed fraction of this stage in [0, 1].
    fn run_stage(
        &self,
        request: &StageRequest<'_>,
        progress: &dyn Fn(f64),
    ) -> Result<Vec<PathBuf>, TranscodeError>;
}
