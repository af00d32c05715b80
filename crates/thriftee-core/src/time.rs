//! Coarse "Posted ... ago" age captions for listing cards.

use chrono::{DateTime, Utc};

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Buckets the age of `created_at` relative to `now` into minutes, hours or
/// days. Future timestamps (clock skew) are not clamped; the signed minute
/// count renders as-is.
pub fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes();
    if minutes < MINUTES_PER_HOUR {
        format!("Posted {} minute{} ago", minutes, plural(minutes))
    } else if minutes < MINUTES_PER_DAY {
        let hours = minutes / MINUTES_PER_HOUR;
        format!("Posted {} hour{} ago", hours, plural(hours))
    } else {
        let days = minutes / MINUTES_PER_DAY;
        format!("Posted {} day{} ago", days, plural(days))
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
