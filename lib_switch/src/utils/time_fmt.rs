use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/// Renders a duration as `HhMmSs`, dropping leading zero units.
///
/// The value is rounded to the nearest second first, so `59.6s` becomes `1m0s`.
/// Zero renders as `0s`.
pub fn format_duration(d: Duration) -> String {
    let total = (d.as_millis() + 500) / 1000;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;

    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Formats a timestamp as RFC 3339 in UTC with second precision (`2024-05-01T12:00:00Z`).
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Time elapsed between `since` and `now`; clock skew that puts `since` in the
/// future counts as zero.
pub fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_seconds_minutes_and_hours() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2m30s");
        assert_eq!(format_duration(Duration::from_secs(4545)), "1h15m45s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
    }

    #[test]
    fn rounds_to_nearest_second() {
        assert_eq!(format_duration(Duration::from_millis(59_600)), "1m0s");
        assert_eq!(format_duration(Duration::from_millis(1_400)), "1s");
    }

    #[test]
    fn future_timestamps_count_as_zero_elapsed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap();
        assert_eq!(elapsed_since(later, now), Duration::ZERO);
        assert_eq!(elapsed_since(now, later), Duration::from_secs(30));
    }

    #[test]
    fn utc_timestamps_use_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_utc(ts), "2024-05-01T12:00:00Z");
    }
}
