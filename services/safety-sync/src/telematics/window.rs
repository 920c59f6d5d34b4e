use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Time range requested from the provider for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    /// Compute the window for a run starting at `now`.
    ///
    /// Without a usable checkpoint the window covers the last `window_days`.
    /// With one, it starts `lookback_hours` before the checkpoint so that
    /// status changes on recent events are picked up again.
    pub fn from_checkpoint(
        cursor: Option<&str>,
        now: DateTime<Utc>,
        window_days: u32,
        lookback_hours: u32,
    ) -> Self {
        let checkpoint = cursor.and_then(|raw| {
            let parsed = parse_cursor(raw);
            if parsed.is_none() {
                tracing::warn!(cursor = raw, "ignoring unparseable checkpoint");
            }
            parsed
        });

        let from = match checkpoint {
            Some(at) => at.min(now) - Duration::hours(i64::from(lookback_hours)),
            None => now - Duration::days(i64::from(window_days)),
        };

        Self { from, to: now }
    }
}

/// Checkpoints are written as RFC 3339.
pub fn parse_cursor(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_cursor(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The next checkpoint: the newest event time seen, never moving backwards.
pub fn advance_cursor(previous: Option<&str>, latest: Option<DateTime<Utc>>) -> Option<String> {
    let previous_at = previous.and_then(parse_cursor);
    match (previous_at, latest) {
        (Some(prev), Some(latest)) => Some(format_cursor(prev.max(latest))),
        (None, Some(latest)) => Some(format_cursor(latest)),
        _ => previous.map(str::to_owned),
    }
}

/// Latest event time the checkpoint may move to. A failed write holds it
/// at the failed event so the next window covers that record again.
pub fn resume_point(
    latest_stored: Option<DateTime<Utc>>,
    earliest_failed: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match earliest_failed {
        Some(failed) => latest_stored.map(|latest| latest.min(failed)),
        None => latest_stored,
    }
}
