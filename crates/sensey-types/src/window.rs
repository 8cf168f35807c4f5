//! Symbolic time windows for range queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A symbolic query window, resolved to `[now - delta, now]` at query time.
///
/// `All` imposes no lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeWindow {
    OneHour,
    SixHours,
    OneDay,
    ThreeDays,
    SevenDays,
    All,
}

impl TimeWindow {
    /// All windows, shortest first.
    pub const ALL: [TimeWindow; 6] = [
        TimeWindow::OneHour,
        TimeWindow::SixHours,
        TimeWindow::OneDay,
        TimeWindow::ThreeDays,
        TimeWindow::SevenDays,
        TimeWindow::All,
    ];

    /// The window's wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::OneHour => "1h",
            TimeWindow::SixHours => "6h",
            TimeWindow::OneDay => "1d",
            TimeWindow::ThreeDays => "3d",
            TimeWindow::SevenDays => "7d",
            TimeWindow::All => "all",
        }
    }

    /// Resolve the window's lower bound relative to `now`.
    ///
    /// Returns `None` for [`TimeWindow::All`].
    pub fn cutoff(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let delta = match self {
            TimeWindow::OneHour => Duration::hours(1),
            TimeWindow::SixHours => Duration::hours(6),
            TimeWindow::OneDay => Duration::days(1),
            TimeWindow::ThreeDays => Duration::days(3),
            TimeWindow::SevenDays => Duration::days(7),
            TimeWindow::All => return None,
        };
        Some(now - delta)
    }

    /// Whether `ts` falls inside the window resolved at `now`.
    pub fn contains(self, ts: OffsetDateTime, now: OffsetDateTime) -> bool {
        match self.cutoff(now) {
            Some(cutoff) => ts >= cutoff && ts <= now,
            None => ts <= now,
        }
    }
}

impl Default for TimeWindow {
    /// The dashboard's default window.
    fn default() -> Self {
        TimeWindow::ThreeDays
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeWindow::OneHour),
            "6h" => Ok(TimeWindow::SixHours),
            "1d" => Ok(TimeWindow::OneDay),
            "3d" => Ok(TimeWindow::ThreeDays),
            "7d" => Ok(TimeWindow::SevenDays),
            "all" => Ok(TimeWindow::All),
            other => Err(format!("unknown time window '{other}'")),
        }
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(w: TimeWindow) -> Self {
        w.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_all_variants() {
        for window in TimeWindow::ALL {
            assert_eq!(window.as_str().parse::<TimeWindow>().unwrap(), window);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("2w".parse::<TimeWindow>().is_err());
        assert!("".parse::<TimeWindow>().is_err());
        assert!("1H".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn test_cutoff_resolution() {
        let now = datetime!(2025-06-01 12:00:00 UTC);
        assert_eq!(
            TimeWindow::OneHour.cutoff(now),
            Some(datetime!(2025-06-01 11:00:00 UTC))
        );
        assert_eq!(
            TimeWindow::ThreeDays.cutoff(now),
            Some(datetime!(2025-05-29 12:00:00 UTC))
        );
        assert_eq!(TimeWindow::All.cutoff(now), None);
    }

    #[test]
    fn test_contains() {
        let now = datetime!(2025-06-01 12:00:00 UTC);
        // 30 minutes ago is inside 1h; 2 hours ago is not.
        assert!(TimeWindow::OneHour.contains(datetime!(2025-06-01 11:30:00 UTC), now));
        assert!(!TimeWindow::OneHour.contains(datetime!(2025-06-01 10:00:00 UTC), now));
        // `all` accepts anything up to now.
        assert!(TimeWindow::All.contains(datetime!(1970-01-01 00:00:00 UTC), now));
    }

    #[test]
    fn test_default_is_three_days() {
        assert_eq!(TimeWindow::default(), TimeWindow::ThreeDays);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&TimeWindow::SixHours).unwrap();
        assert_eq!(json, "\"6h\"");
        let back: TimeWindow = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(back, TimeWindow::All);
    }
}
