//! Human-readable renderings for admin listings.

use chrono::{DateTime, Duration, Utc};

/// Render an elapsed duration as "never", "just now", "Xm", "Xhr" or "Xhr Ym".
pub fn format_timedelta(delta: Option<Duration>) -> String {
    let Some(delta) = delta else {
        return "never".to_string();
    };

    let minutes = delta.num_minutes().max(0);
    if minutes == 0 {
        return "just now".to_string();
    }

    let hours = minutes / 60;
    let minutes = minutes % 60;
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}hr"),
        (h, m) => format!("{h}hr {m}m"),
    }
}

/// Render the time until `next_run`, using its largest whole unit.
pub fn format_next_run(next_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(next_run) = next_run else {
        return "—".to_string();
    };

    let remaining = next_run - now;
    if remaining <= Duration::zero() {
        return "now".to_string();
    }

    if remaining.num_days() > 0 {
        format!("in {}d", remaining.num_days())
    } else if remaining.num_hours() > 0 {
        format!("in {}h", remaining.num_hours())
    } else if remaining.num_minutes() > 0 {
        format!("in {}m", remaining.num_minutes())
    } else {
        format!("in {}s", remaining.num_seconds().max(1))
    }
}
