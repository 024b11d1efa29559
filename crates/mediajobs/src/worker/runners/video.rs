use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::TranscodeError;
use crate::jobs::MediaKind;
use crate::worker::executor::RunContext;
use crate::worker::transcoder::{StageRequest, Transcoder};

use super::{run_codec_stage, Attachment, MediaRunner, RunOutput, FINALIZE_STAGE};

/// Side stage that extracts a poster frame. Not part of the weighted plan.
pub const THUMBNAIL_STAGE: &str = "thumbnail";

/// Encodes one HLS rendition per plan stage, then writes the master
/// playlist during finalize.
///
/// Every rendition playlist and segment is imported next to the master, so
/// relative URIs inside the playlists keep resolving.
pub struct VideoHlsRunner {
    transcoder: Arc<dyn Transcoder>,
}

impl VideoHlsRunner {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    fn extract_thumbnail(&self, ctx: &RunContext<'_>, field: &str) -> Option<Attachment> {
        let request = StageRequest {
            kind: MediaKind::Video,
            stage: THUMBNAIL_STAGE,
            source: ctx.source_path(),
            work_dir: ctx.work_dir(),
        };
        let files = match self.transcoder.run_stage(&request, &|_| {}) {
            Ok(files) => files,
            Err(e) => {
                warn!("Thumbnail extraction failed for job {}: {}", ctx.job().id, e);
                return None;
            }
        };
        let Some(frame) = files.first() else {
            warn!("Thumbnail stage produced no frame for job {}", ctx.job().id);
            return None;
        };
        match ctx.import_artifact(frame) {
            Ok(relative_path) => Some(Attachment {
                field: field.to_string(),
                relative_path,
            }),
            Err(e) => {
                warn!("Could not store thumbnail for job {}: {}", ctx.job().id, e);
                None
            }
        }
    }
}

fn is_playlist(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("m3u8"))
}

impl MediaRunner for VideoHlsRunner {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn run(&self, ctx: &RunContext<'_>) -> Result<RunOutput, TranscodeError> {
        let renditions: Vec<String> = ctx
            .plan()
            .iter()
            .filter(|e| e.key != FINALIZE_STAGE)
            .map(|e| e.key.clone())
            .collect();

        let mut rendition_files: Vec<PathBuf> = Vec::new();
        for rendition in &renditions {
            let files = run_codec_stage(self.transcoder.as_ref(), ctx, rendition)?;
            debug!("Rendition {} wrote {} files", rendition, files.len());
            rendition_files.extend(files);
        }

        let attachment = match ctx.upload_config().thumbnail_field.as_deref() {
            Some(field) => self.extract_thumbnail(ctx, field),
            None => None,
        };

        let master_files = run_codec_stage(self.transcoder.as_ref(), ctx, FINALIZE_STAGE)?;
        let master = master_files
            .iter()
            .find(|p| is_playlist(p))
            .cloned()
            .ok_or_else(|| TranscodeError::Codec {
                stage: FINALIZE_STAGE.to_string(),
                message: "no master playlist written".to_string(),
            })?;

        ctx.ensure_target()?;
        ctx.ensure_current()?;
        for file in &rendition_files {
            ctx.import_artifact(file)?;
        }
        let mut primary = None;
        for file in &master_files {
            let stored = ctx.import_artifact(file)?;
            if *file == master {
                primary = Some(stored);
            }
        }
        ctx.report_stage_progress(1.0);

        let mut output = RunOutput::new(primary.ok_or_else(|| TranscodeError::NoOutput {
            stage: FINALIZE_STAGE.to_string(),
        })?);
        output.attachments.extend(attachment);
        Ok(output)
    }
}
