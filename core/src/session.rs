//! Trading session classification
//!
//! Buckets an event timestamp into one of five session labels using a fixed,
//! DST-aware Eastern-time schedule. London owns its overlap with Tokyo, so
//! its window is always tested first.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CoreError;

/// Trading session label assigned to a trade at entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    London,
    NewYorkAm,
    NewYorkPm,
    Tokyo,
    OffHours,
}

impl Session {
    /// Classify a UTC timestamp by its Eastern-time hour of day.
    ///
    /// Half-open windows, in priority order:
    /// London [03,08), New York AM [08,12), New York PM [12,17),
    /// Off-hours [17,19), Tokyo [19,24) and [00,03).
    ///
    /// Tokyo wraps midnight into the 00:00-03:00 window, so checking it
    /// before London would swallow the 03:00 boundary. Keep London first.
    pub fn classify(timestamp: DateTime<Utc>) -> Session {
        let hour = timestamp.with_timezone(&New_York).hour();
        match hour {
            3..=7 => Session::London,
            8..=11 => Session::NewYorkAm,
            12..=16 => Session::NewYorkPm,
            17 | 18 => Session::OffHours,
            _ => Session::Tokyo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::London => "london",
            Session::NewYorkAm => "new_york_am",
            Session::NewYorkPm => "new_york_pm",
            Session::Tokyo => "tokyo",
            Session::OffHours => "off_hours",
        }
    }
}

impl FromStr for Session {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "london" => Ok(Session::London),
            "new_york_am" => Ok(Session::NewYorkAm),
            "new_york_pm" => Ok(Session::NewYorkPm),
            "tokyo" => Ok(Session::Tokyo),
            "off_hours" => Ok(Session::OffHours),
            other => Err(CoreError::UnknownSession(other.to_string())),
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    /// Build the UTC instant for a wall-clock time in New York on a winter
    /// date (EST, UTC-5).
    fn winter_et(hour: u32, minute: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        New_York
            .from_local_datetime(&naive)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Same for a summer date (EDT, UTC-4), to pin DST awareness.
    fn summer_et(hour: u32, minute: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(2024, 7, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        New_York
            .from_local_datetime(&naive)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn london_owns_the_overlap_window() {
        assert_eq!(Session::classify(winter_et(3, 0)), Session::London);
        assert_eq!(Session::classify(winter_et(3, 59)), Session::London);
        assert_eq!(Session::classify(winter_et(7, 59)), Session::London);
    }

    #[test]
    fn tokyo_ends_just_before_london() {
        assert_eq!(Session::classify(winter_et(2, 59)), Session::Tokyo);
        assert_eq!(Session::classify(winter_et(0, 0)), Session::Tokyo);
        assert_eq!(Session::classify(winter_et(19, 0)), Session::Tokyo);
        assert_eq!(Session::classify(winter_et(23, 59)), Session::Tokyo);
    }

    #[test]
    fn new_york_windows_split_at_noon() {
        assert_eq!(Session::classify(winter_et(8, 0)), Session::NewYorkAm);
        assert_eq!(Session::classify(winter_et(11, 59)), Session::NewYorkAm);
        assert_eq!(Session::classify(winter_et(12, 0)), Session::NewYorkPm);
        assert_eq!(Session::classify(winter_et(16, 59)), Session::NewYorkPm);
    }

    #[test]
    fn off_hours_between_close_and_tokyo_open() {
        assert_eq!(Session::classify(winter_et(17, 0)), Session::OffHours);
        assert_eq!(Session::classify(winter_et(18, 59)), Session::OffHours);
    }

    #[test]
    fn classification_follows_dst() {
        // 12:00 UTC is 07:00 EST in winter (London) but 08:00 EDT in summer
        // (New York AM).
        let winter_noon_utc = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(Session::classify(winter_noon_utc), Session::London);

        let summer_noon_utc = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(Session::classify(summer_noon_utc), Session::NewYorkAm);

        assert_eq!(Session::classify(summer_et(3, 30)), Session::London);
        assert_eq!(Session::classify(summer_et(2, 59)), Session::Tokyo);
    }

    #[test]
    fn label_round_trips_through_str() {
        for session in [
            Session::London,
            Session::NewYorkAm,
            Session::NewYorkPm,
            Session::Tokyo,
            Session::OffHours,
        ] {
            assert_eq!(session.as_str().parse::<Session>().unwrap(), session);
        }
        assert!("sydney".parse::<Session>().is_err());
    }
}
