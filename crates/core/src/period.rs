use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open measurement window `[start, expiry)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl Period {
    /// The window of `repeat_minutes` beginning at `start`, or `None` when its
    /// expiry falls outside the representable time range.
    pub fn starting_at(start: DateTime<Utc>, repeat_minutes: i64) -> Option<Self> {
        let expiry = start.checked_add_signed(Duration::try_minutes(repeat_minutes)?)?;
        Some(Self { start, expiry })
    }

    /// Whether `t` falls inside the window. `expiry` itself belongs to the next window.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.expiry
    }

    /// A period has lapsed once `now` reaches its expiry.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    pub fn length(&self) -> Duration {
        self.expiry - self.start
    }
}

/// Human-readable form of a repeat period, e.g. "every 2 hours".
pub fn describe_repeat(minutes: i64) -> String {
    const DAY: i64 = 24 * 60;
    match minutes {
        m if m <= 0 => "never".to_string(),
        DAY => "every day".to_string(),
        m if m % DAY == 0 => format!("every {} days", m / DAY),
        60 => "every hour".to_string(),
        m if m % 60 == 0 => format!("every {} hours", m / 60),
        1 => "every minute".to_string(),
        m => format!("every {} minutes", m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_is_half_open() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let p = Period::starting_at(t, 60).unwrap();

        assert!(p.contains(t));
        assert!(p.contains(t + Duration::minutes(59)));
        assert!(!p.contains(t + Duration::minutes(60)));
        assert!(!p.contains(t - Duration::seconds(1)));
        assert_eq!(p.length(), Duration::minutes(60));
        assert!(p.has_lapsed(t + Duration::minutes(60)));
        assert!(!p.has_lapsed(t + Duration::minutes(30)));
    }

    #[test]
    fn unrepresentable_expiry_is_none() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert!(Period::starting_at(t, 10_000_000_000_000).is_none());
        assert!(Period::starting_at(t, i64::MAX).is_none());
    }

    #[test]
    fn repeat_descriptions() {
        assert_eq!(describe_repeat(1440), "every day");
        assert_eq!(describe_repeat(2880), "every 2 days");
        assert_eq!(describe_repeat(60), "every hour");
        assert_eq!(describe_repeat(120), "every 2 hours");
        assert_eq!(describe_repeat(90), "every 90 minutes");
        assert_eq!(describe_repeat(1), "every minute");
        assert_eq!(describe_repeat(0), "never");
    }
}
