use crate::domain::window::InvestmentTimeWindow;
use chrono::{DateTime, Duration, Utc};

const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_MINUTE: i64 = 60;

pub const COMPLETED_LABEL: &str = "Completed";
pub const SUB_MINUTE_LABEL: &str = "< 1m";

/// Linear estimate of the interest accrued by `now`.
///
/// Display-only approximation: the server's `isCompleted` flag and payout are the source of truth.
/// Malformed windows (non-positive duration) count as matured; a non-finite total yields `0`.
pub fn calculate_progressive_interest(window: &InvestmentTimeWindow, now: DateTime<Utc>) -> f64 {
    if !window.total_interest.is_finite() {
        return 0.0;
    }
    if window.is_completed || window.duration_ms() <= 0 {
        return window.total_interest;
    }
    if now < window.start_date {
        return 0.0;
    }
    if now >= window.end_date {
        return window.total_interest;
    }

    window.total_interest * elapsed_ratio(window, now)
}

/// Elapsed share of the window scaled to `[0, 100]`.
pub fn calculate_progress_percentage(window: &InvestmentTimeWindow, now: DateTime<Utc>) -> f64 {
    if window.is_completed || window.duration_ms() <= 0 {
        return 100.0;
    }
    if now < window.start_date {
        return 0.0;
    }
    if now >= window.end_date {
        return 100.0;
    }

    (elapsed_ratio(window, now) * 100.0).clamp(0.0, 100.0)
}

/// Renders the time left until `end_date` at one granularity tier: `"2d 5h"`, `"5h 30m"`, `"30m"`.
pub fn format_time_remaining(end_date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = end_date - now;
    if remaining <= Duration::zero() {
        return COMPLETED_LABEL.to_string();
    }

    let secs = remaining.num_seconds();
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        SUB_MINUTE_LABEL.to_string()
    }
}

/// Matured windows always need server confirmation; otherwise refresh once `last_fetch` is older
/// than the threshold.
pub fn should_refresh_investment(
    window: &InvestmentTimeWindow,
    last_fetch: DateTime<Utc>,
    threshold_minutes: i64,
    now: DateTime<Utc>,
) -> bool {
    if window.is_matured(now) {
        return true;
    }
    now - last_fetch > staleness_threshold(threshold_minutes)
}

/// `minutes` as a duration, saturating at the representable range.
pub fn staleness_threshold(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(if minutes < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// Sum of unrounded per-window estimates.
pub fn aggregate_interest<'a, I>(windows: I, now: DateTime<Utc>) -> f64
where
    I: IntoIterator<Item = &'a InvestmentTimeWindow>,
{
    windows
        .into_iter()
        .map(|w| calculate_progressive_interest(w, now))
        .fold(0.0, |acc, v| acc + v)
}

/// Rounds to currency precision. Call only at the display edge.
pub fn round_currency(amount: f64) -> f64 {
    if !amount.is_finite() {
        return 0.0;
    }
    (amount * 100.0).round() / 100.0
}

fn elapsed_ratio(window: &InvestmentTimeWindow, now: DateTime<Utc>) -> f64 {
    let total = window.duration_ms();
    if total <= 0 {
        return 1.0;
    }
    let elapsed = (now - window.start_date).num_milliseconds();
    (elapsed as f64 / total as f64).clamp(0.0, 1.0)
}
