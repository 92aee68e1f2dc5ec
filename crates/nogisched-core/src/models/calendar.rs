//! Month keys used to address the schedule feed and its cache entries.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar month, displayed and parsed as `YYYYMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1000..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The month containing today's local date.
    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month. Stays put at 9999/12.
    pub fn next(&self) -> Self {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        Self::new(year, month).unwrap_or(*self)
    }

    /// The preceding month. Stays put at 1000/01.
    pub fn prev(&self) -> Self {
        let (year, month) = if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        };
        Self::new(year, month).unwrap_or(*self)
    }

    /// Whether `date` falls in this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// "2024年1月"
    pub fn display_long(&self) -> String {
        format!("{}年{}月", self.year, self.month)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("expected YYYYMM, got {:?}", s));
        }
        let year: i32 = s[..4].parse().map_err(|_| format!("bad year in {:?}", s))?;
        let month: u32 = s[4..].parse().map_err(|_| format!("bad month in {:?}", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in {:?}", s))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let ym: YearMonth = "202401".parse().unwrap();
        assert_eq!(ym.year(), 2024);
        assert_eq!(ym.month(), 1);
        assert_eq!(ym.to_string(), "202401");
        assert_eq!(ym.display_long(), "2024年1月");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("2024-01".parse::<YearMonth>().is_err());
        assert!("202413".parse::<YearMonth>().is_err());
        assert!("202400".parse::<YearMonth>().is_err());
        assert!("abcdef".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_navigation_wraps_years() {
        let dec = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec.next().to_string(), "202401");
        assert_eq!(dec.next().prev(), dec);
        let jan = YearMonth::new(2024, 1).unwrap();
        assert_eq!(jan.prev().to_string(), "202312");
    }

    #[test]
    fn test_navigation_stops_at_range_ends() {
        let last = YearMonth::new(9999, 12).unwrap();
        assert_eq!(last.next(), last);
        assert_eq!(last.next().to_string(), "999912");

        let first = YearMonth::new(1000, 1).unwrap();
        assert_eq!(first.prev(), first);
        assert_eq!(first.next().to_string(), "100002");
    }

    #[test]
    fn test_contains() {
        let ym = YearMonth::new(2024, 1).unwrap();
        assert!(ym.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!ym.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    }

    #[test]
    fn test_serde_as_string() {
        let ym = YearMonth::new(2024, 3).unwrap();
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"202403\"");
        let back: YearMonth = serde_json::from_str("\"202403\"").unwrap();
        assert_eq!(back, ym);
    }
}
