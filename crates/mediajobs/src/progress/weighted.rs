//! Weighted stage progress.

use crate::jobs::model::{Job, JobStatus, StagePlanEntry};

/// Highest stage fraction a worker may report without real advancement.
pub const STAGE_PROGRESS_CEILING: f64 = 0.999;

/// Overall percentage from stage weights, or `None` when the job carries no
/// positive total weight.
///
/// `round(100 * (completed + weight * stage_progress) / total)`, clamped to
/// 0..=100. Missing parts count as zero.
pub fn compute_weighted_percent(job: &Job) -> Option<u8> {
    let total = job.stage_total_weight.filter(|t| *t > 0)?;
    let completed = f64::from(job.stage_completed_weight.unwrap_or(0));
    let weight = f64::from(job.stage_weight.unwrap_or(0));
    let fraction = sanitize_fraction(job.stage_progress.unwrap_or(0.0));

    let percent = (100.0 * (completed + weight * fraction) / f64::from(total)).round();
    Some(percent.clamp(0.0, 100.0) as u8)
}

/// Whether a stage fraction of 1.0 may be stored as-is.
///
/// Only a finished job, a changed stage key or a grown completed weight count
/// as real advancement. Anything else is a worker repeating "100% of this
/// stage" and gets capped.
pub fn should_allow_stage_progress_one(
    prev_stage: Option<&str>,
    next_stage: Option<&str>,
    prev_completed_weight: Option<u32>,
    next_completed_weight: Option<u32>,
    next_status: JobStatus,
) -> bool {
    if next_status == JobStatus::Done {
        return true;
    }
    if next_stage.is_some() && next_stage != prev_stage {
        return true;
    }
    next_completed_weight.unwrap_or(0) > prev_completed_weight.unwrap_or(0)
}

/// Clamps a stage fraction into [0, 1], capping 1.0 at the ceiling unless
/// `allow_one` is set.
pub fn cap_stage_progress(fraction: f64, allow_one: bool) -> f64 {
    let fraction = sanitize_fraction(fraction);
    if fraction >= 1.0 && !allow_one {
        STAGE_PROGRESS_CEILING
    } else {
        fraction
    }
}

/// Weight of the plan entry with the given key.
pub fn infer_stage_weight(plan: &[StagePlanEntry], key: &str) -> Option<u32> {
    plan.iter().find(|entry| entry.key == key).map(|e| e.weight)
}

/// Sum of the weights of all stages strictly before `index`.
///
/// `None` for an empty plan or an index past the end of the plan.
pub fn infer_completed_weight(plan: &[StagePlanEntry], index: u32) -> Option<u32> {
    let index = usize::try_from(index).ok()?;
    if plan.is_empty() || index > plan.len() {
        return None;
    }
    Some(saturating_weight_sum(&plan[..index]))
}

/// Sum of all stage weights, saturating at `u32::MAX`.
pub fn plan_total_weight(plan: &[StagePlanEntry]) -> u32 {
    saturating_weight_sum(plan)
}

fn saturating_weight_sum(entries: &[StagePlanEntry]) -> u32 {
    entries
        .iter()
        .fold(0u32, |total, e| total.saturating_add(e.weight))
}

fn sanitize_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}
