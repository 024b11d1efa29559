//! Property-based tests for progress accounting.
//!
//! Workers report stages and fractions out of order, repeat themselves and
//! mix manual percentages in. Stored progress must only ever move forward.

use proptest::prelude::*;

use mediajobs::db::Database;
use mediajobs::jobs::{Job, JobLedger, JobStatus, JobUpdate, MediaKind, StagePlanEntry, TargetRef, UpsertJob};
use mediajobs::progress::compute_weighted_percent;

fn video_plan() -> Vec<StagePlanEntry> {
    vec![
        StagePlanEntry::new("video_1080", 40),
        StagePlanEntry::new("video_720", 30),
        StagePlanEntry::new("finalize", 30),
    ]
}

/// One checkpoint: optional stage position, stage fraction and manual percent.
fn arb_update() -> impl Strategy<Value = (Option<u32>, Option<f64>, Option<u8>)> {
    (
        prop::option::of(0u32..3),
        prop::option::of(0.0f64..=1.0),
        prop::option::of(0u8..=100),
    )
}

fn to_job_update(
    plan: &[StagePlanEntry],
    (index, fraction, manual): (Option<u32>, Option<f64>, Option<u8>),
) -> JobUpdate {
    let mut update = JobUpdate::new();
    if let Some(index) = index {
        update = update.stage(index, plan[index as usize].key.clone());
    }
    if let Some(fraction) = fraction {
        update = update.stage_progress(fraction);
    }
    if let Some(manual) = manual {
        update = update.progress(manual);
    }
    update
}

fn processing_job(ledger: &JobLedger) -> Job {
    ledger
        .upsert(
            UpsertJob::new(TargetRef::new("post", "1"), "video", MediaKind::Video)
                .status(JobStatus::Processing)
                .stage_plan(video_plan()),
        )
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Stored progress never decreases and stays below 100 until DONE.
    #[test]
    fn progress_never_regresses(updates in prop::collection::vec(arb_update(), 1..24)) {
        let ledger = JobLedger::new(Database::open_in_memory().unwrap());
        let plan = video_plan();
        let job = processing_job(&ledger);

        let mut last = job.progress;
        for raw in updates {
            let updated = ledger.update(&job.id, to_job_update(&plan, raw)).unwrap();
            prop_assert!(updated.progress >= last, "{} -> {}", last, updated.progress);
            prop_assert!(updated.progress <= 99);
            if let Some(fraction) = updated.stage_progress {
                prop_assert!((0.0..=1.0).contains(&fraction));
            }
            last = updated.progress;
        }

        let done = ledger
            .update(&job.id, JobUpdate::new().status(JobStatus::Done))
            .unwrap();
        prop_assert_eq!(done.progress, 100);
    }

    /// Weighted percent grows with completed weight and never exceeds 100.
    #[test]
    fn weighted_percent_is_monotonic_in_completed_weight(
        total in 1u32..1000,
        stage_weight in 0u32..500,
        fraction in 0.0f64..=1.0,
        low in 0u32..1000,
        step in 0u32..1000,
    ) {
        let ledger = JobLedger::new(Database::open_in_memory().unwrap());
        let mut job = processing_job(&ledger);
        job.stage_total_weight = Some(total);
        job.stage_weight = Some(stage_weight);
        job.stage_progress = Some(fraction);

        job.stage_completed_weight = Some(low);
        let at_low = compute_weighted_percent(&job).unwrap();
        job.stage_completed_weight = Some(low.saturating_add(step));
        let at_high = compute_weighted_percent(&job).unwrap();

        prop_assert!(at_low <= at_high);
        prop_assert!(at_high <= 100);
    }
}

#[test]
fn entering_finalize_reaches_seventy_percent() {
    let ledger = JobLedger::new(Database::open_in_memory().unwrap());
    let job = processing_job(&ledger);
    let updated = ledger
        .update(&job.id, JobUpdate::new().stage(2, "finalize"))
        .unwrap();
    assert!(updated.progress >= 70);
    assert_eq!(updated.stage_completed_weight, Some(70));
    assert_eq!(updated.stage_weight, Some(30));
}
