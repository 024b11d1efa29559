//! Flips a target to "available" once all of its jobs are finished.

use std::sync::Arc;

use crate::jobs::{Job, JobLedger};

use super::commit::CommitScope;
use super::target::TargetRegistry;

/// What a trigger evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Some sibling jobs are still queued or processing.
    Pending { unfinished: usize },
    /// The target could not be resolved or updated; nothing happened.
    Unresolved,
    /// All jobs are terminal and the target's capabilities were applied.
    Evaluated { converted_set: bool, hook_fired: bool },
}

/// Post-commit availability check.
#[derive(Clone)]
pub struct AvailabilityTrigger {
    ledger: JobLedger,
    registry: Arc<TargetRegistry>,
}

impl AvailabilityTrigger {
    pub fn new(ledger: JobLedger, registry: Arc<TargetRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Evaluates the target of `job`. Must only run after the write that
    /// finished `job` has committed; see [`AvailabilityTrigger::schedule`].
    ///
    /// Errors are logged and swallowed.
    pub fn maybe_mark_available(&self, job: &Job) -> TriggerOutcome {
        let siblings = self.ledger.list_for_target(&job.target);
        let unfinished = siblings.iter().filter(|j| !j.is_terminal()).count();
        if unfinished > 0 {
            log::debug!(
                "{} still has {} unfinished jobs; not marking available",
                job.target,
                unfinished
            );
            return TriggerOutcome::Pending { unfinished };
        }

        let target = match self.registry.resolve(&job.target) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("Availability check skipped for {}: {}", job.target, e);
                return TriggerOutcome::Unresolved;
            }
        };

        let mut converted_set = false;
        if let Some(flag) = target.converted_flag() {
            if !flag.is_converted() {
                if let Err(e) = flag.set_converted(true) {
                    log::warn!("Failed to set converted flag on {}: {}", job.target, e);
                    return TriggerOutcome::Unresolved;
                }
                converted_set = true;
            }
        }

        let mut hook_fired = false;
        if let Some(hook) = target.availability() {
            if hook.is_available() {
                match hook.on_available() {
                    Ok(()) => hook_fired = true,
                    Err(e) => log::warn!("on_available failed for {}: {}", job.target, e),
                }
            }
        }

        if converted_set || hook_fired {
            log::info!(
                "{} is available (converted flag set: {}, hook fired: {})",
                job.target,
                converted_set,
                hook_fired
            );
        }

        TriggerOutcome::Evaluated {
            converted_set,
            hook_fired,
        }
    }

    /// Defers the evaluation of `job` until `scope` commits.
    pub fn schedule(&self, scope: &mut CommitScope, job: Job) {
        let trigger = self.clone();
        scope.on_commit(move || {
            trigger.maybe_mark_available(&job);
        });
    }
}
