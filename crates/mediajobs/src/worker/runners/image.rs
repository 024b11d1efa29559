use std::sync::Arc;

use crate::error::TranscodeError;
use crate::jobs::MediaKind;
use crate::worker::executor::RunContext;
use crate::worker::transcoder::Transcoder;

use super::{run_single_artifact, MediaRunner, RunOutput};

/// Converts an uploaded image into one web-ready image.
pub struct ImageRunner {
    transcoder: Arc<dyn Transcoder>,
}

impl ImageRunner {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }
}

impl MediaRunner for ImageRunner {
    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<RunOutput, TranscodeError> {
        run_single_artifact(self.transcoder.as_ref(), ctx)
    }
}
