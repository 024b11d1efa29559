//! Attaches finished artifacts to their target by reference.
//!
//! Binding and marking the target converted are separate decisions: a
//! thumbnail finishing must not flag the whole target ready while its video
//! is still encoding.

use std::sync::Arc;

use crate::availability::TargetRegistry;
use crate::error::TargetError;
use crate::jobs::TargetRef;
use crate::storage::MediaStorage;

/// Result of a bind attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The path was attached; `changed_fields` lists what the target changed.
    Bound { changed_fields: Vec<String> },
    /// No artifact exists at the path; the target was not touched.
    MissingArtifact,
    /// The target no longer exists.
    TargetGone,
    /// The target refused the field or failed to store it.
    Rejected { reason: String },
}

impl BindOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, BindOutcome::Bound { .. })
    }
}

#[derive(Clone)]
pub struct OutputBinder {
    storage: Arc<dyn MediaStorage>,
    registry: Arc<TargetRegistry>,
}

impl OutputBinder {
    pub fn new(storage: Arc<dyn MediaStorage>, registry: Arc<TargetRegistry>) -> Self {
        Self { storage, registry }
    }

    /// Attaches `relative_path` to `field` on `target`.
    ///
    /// The artifact must already exist in storage. The converted flag is
    /// only set when `mark_converted` is true and the target has one.
    pub fn bind_output(
        &self,
        target: &TargetRef,
        field: &str,
        relative_path: &str,
        mark_converted: bool,
    ) -> BindOutcome {
        if !self.storage.exists(relative_path) {
            log::warn!(
                "Refusing to bind missing artifact '{}' to {} field '{}'",
                relative_path,
                target,
                field
            );
            return BindOutcome::MissingArtifact;
        }

        let resolved = match self.registry.resolve(target) {
            Ok(resolved) => resolved,
            Err(TargetError::NotFound { .. }) => {
                log::info!("Target {} disappeared before binding '{}'", target, field);
                return BindOutcome::TargetGone;
            }
            Err(e) => {
                log::warn!("Cannot bind '{}' on {}: {}", field, target, e);
                return BindOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let mut changed_fields = match resolved.attach_media(field, relative_path) {
            Ok(changed) => changed,
            Err(TargetError::NotFound { .. }) => return BindOutcome::TargetGone,
            Err(e) => {
                log::warn!("Target {} rejected '{}': {}", target, field, e);
                return BindOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        if mark_converted {
            if let Some(flag) = resolved.converted_flag() {
                if !flag.is_converted() {
                    match flag.set_converted(true) {
                        Ok(()) => changed_fields.push("is_converted".to_string()),
                        Err(e) => {
                            log::warn!("Failed to mark {} converted: {}", target, e)
                        }
                    }
                }
            }
        }

        if let Some(hook) = resolved.media_hook() {
            if let Err(e) = hook.on_media_converted(field, &changed_fields) {
                log::warn!("on_media_converted failed for {} '{}': {}", target, field, e);
            }
        }

        log::debug!(
            "Bound '{}' to {} field '{}' (changed: {:?})",
            relative_path,
            target,
            field,
            changed_fields
        );
        BindOutcome::Bound { changed_fields }
    }
}
