//! ETA estimation and message suffixes.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

static RE_ETA_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(~[^)]*left\)\s*$").unwrap());

/// Short human duration: `45s`, `3m 12s`, `1h 2m`.
pub fn format_eta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Removes a trailing `(~... left)` marker.
pub fn strip_previous_eta_suffix(message: &str) -> String {
    RE_ETA_SUFFIX.replace(message, "").trim_end().to_string()
}

/// Replaces any previous ETA marker on `message` with a fresh one.
pub fn append_eta(message: &str, remaining: Duration) -> String {
    let base = strip_previous_eta_suffix(message);
    let suffix = format!("(~{} left)", format_eta(remaining.as_secs()));
    if base.is_empty() {
        suffix
    } else {
        format!("{} {}", base, suffix)
    }
}

/// Linear extrapolation of the remaining time from elapsed time and percent.
///
/// Only defined for `0 < percent < 100` and a start time in the past.
pub fn estimate_remaining(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    percent: u8,
) -> Option<Duration> {
    if percent == 0 || percent >= 100 {
        return None;
    }
    let elapsed_ms = (now - started_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return None;
    }
    let percent = u64::from(percent);
    let elapsed_ms = elapsed_ms as u64;
    let remaining_ms = elapsed_ms.saturating_mul(100 - percent) / percent;
    Some(Duration::from_millis(remaining_ms))
}
