//! Progress accounting: weighted stage percentages and ETA text.
//!
//! Everything here is pure; the ledger applies these functions while merging
//! updates.

pub mod eta;
pub mod weighted;

pub use eta::{append_eta, estimate_remaining, format_eta, strip_previous_eta_suffix};
pub use weighted::{
    cap_stage_progress, compute_weighted_percent, infer_completed_weight, infer_stage_weight,
    plan_total_weight, should_allow_stage_progress_one, STAGE_PROGRESS_CEILING,
};
