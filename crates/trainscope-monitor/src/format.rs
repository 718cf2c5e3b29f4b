//! Display formatting helpers.

use chrono::{DateTime, Utc};

use trainscope_api::JobState;

/// Format an integer with thousands separators, e.g. `1,234,567`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a duration in seconds as `H:MM:SS`, or `M:SS` under an hour.
///
/// Fractions are truncated; negative and non-finite values format as `0:00`.
pub fn format_elapsed_seconds(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Job state as shown to users, noting a pending cancel.
pub fn format_job_state(cancel_requested: bool, state: JobState) -> String {
    if cancel_requested && !state.is_terminal() && !state.is_unspecified() {
        format!("{state} (cancel requested)")
    } else {
        state.to_string()
    }
}

/// Seconds elapsed from `start` to `now`, never negative.
pub fn seconds_since(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
