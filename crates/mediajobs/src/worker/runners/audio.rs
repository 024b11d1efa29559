use std::sync::Arc;

use crate::error::TranscodeError;
use crate::jobs::MediaKind;
use crate::worker::executor::RunContext;
use crate::worker::transcoder::Transcoder;

use super::{run_single_artifact, MediaRunner, RunOutput};

/// Transcodes an uploaded audio file into one streamable file.
pub struct AudioRunner {
    transcoder: Arc<dyn Transcoder>,
}

impl AudioRunner {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }
}

impl MediaRunner for AudioRunner {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<RunOutput, TranscodeError> {
        run_single_artifact(self.transcoder.as_ref(), ctx)
    }
}
