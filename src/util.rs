use chrono::{DateTime, Utc};
use std::time::Duration;
use time_humanize::{Accuracy, HumanTime, Tense};

/// "3 minutes ago" style rendering of a past instant
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    HumanTime::from(Duration::from_secs(secs as u64)).to_text_en(Accuracy::Rough, Tense::Past)
}

pub fn last_read_label(last_read_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match last_read_at {
        Some(at) => humanize_since(at, now),
        None => "never".to_string(),
    }
}

/// `h:mm:ss` or `m:ss`
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn percent(position: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (position as f64 / total as f64 * 100.0).min(100.0)
}
