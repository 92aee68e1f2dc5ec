use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::utils::html_to_text;

/// Schedule category as published by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Category {
    Tv,
    Radio,
    Live,
    Cd,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tv,
        Category::Radio,
        Category::Live,
        Category::Cd,
        Category::Other,
    ];

    /// Parse a feed category id. Unknown values become `Other`.
    pub fn from_wire(cate: &str) -> Self {
        match cate {
            "tv" => Category::Tv,
            "radio" => Category::Radio,
            "live" => Category::Live,
            "cd" => Category::Cd,
            _ => Category::Other,
        }
    }

    /// Feed id, also used on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Category::Tv => "tv",
            Category::Radio => "radio",
            Category::Live => "live",
            Category::Cd => "cd",
            Category::Other => "other",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Tv => "TV",
            Category::Radio => "ラジオ",
            Category::Live => "ライブ",
            Category::Cd => "CD/音楽",
            Category::Other => "その他",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Strict parse for user input; unlike `from_wire` this rejects unknown ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.id() == lower)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// A single schedule entry. Built once per fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Schedule {
    pub code: String,
    pub title: String,
    /// Wall-clock date, "YYYY/MM/DD".
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Empty means the feed carried no member information.
    #[serde(default)]
    pub member_codes: Vec<String>,
}

impl Schedule {
    pub fn has_member_info(&self) -> bool {
        !self.member_codes.is_empty()
    }

    pub fn is_all_day(&self) -> bool {
        self.start_time.is_none()
    }

    /// Parse the "YYYY/MM/DD" date. Single-digit month/day are accepted.
    pub fn naive_date(&self) -> Option<NaiveDate> {
        let mut parts = self.date.trim().split('/');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Local start, with late-night hours carried into the next day.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        let date = self.naive_date()?;
        let clock = parse_clock(self.start_time.as_deref()?)?;
        Some(clock.on(date))
    }

    /// Local end. Never before the start: "23:00〜01:00" ends the next day.
    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        let start = self.starts_at()?;
        let end = parse_clock(self.end_time.as_deref()?)?.on(start.date());
        if end < start {
            Some(end + Duration::days(1))
        } else {
            Some(end)
        }
    }

    /// "18:00〜20:00", "18:00〜" or "終日" for list display.
    pub fn time_range_display(&self) -> String {
        match (&self.start_time, &self.end_time) {
            (Some(start), Some(end)) => format!("{}〜{}", start, end),
            (Some(start), None) => format!("{}〜", start),
            _ => "終日".to_string(),
        }
    }

    /// Description as plain text, if any.
    pub fn description_text(&self) -> Option<String> {
        self.description
            .as_deref()
            .map(html_to_text)
            .filter(|s| !s.is_empty())
    }
}

/// Latest hour accepted in a clock time. Broadcast listings write
/// late-night slots as "25:30".
const MAX_CLOCK_HOUR: u32 = 47;

/// A feed clock time split into a day offset and a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub days: u32,
    pub time: NaiveTime,
}

impl ClockTime {
    /// The instant this clock time names when read on `date`.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.time) + Duration::days(i64::from(self.days))
    }
}

/// Parse a feed clock time such as "18:00", "9:30" or "25:30".
pub fn parse_clock(s: &str) -> Option<ClockTime> {
    let (hour, minute) = s.trim().split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    // Some entries carry seconds ("18:00:00")
    let minute: u32 = minute.split(':').next()?.parse().ok()?;
    if hour > MAX_CLOCK_HOUR {
        return None;
    }
    Some(ClockTime {
        days: hour / 24,
        time: NaiveTime::from_hms_opt(hour % 24, minute, 0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schedule {
        Schedule {
            code: "1".to_string(),
            title: "TV番組A".to_string(),
            date: "2024/01/15".to_string(),
            start_time: Some("18:00".to_string()),
            end_time: None,
            category: Category::Tv,
            description: Some("<p>Live at <b>Tokyo</b></p>".to_string()),
            link: None,
            member_codes: vec!["m1".to_string()],
        }
    }

    #[test]
    fn test_category_from_wire() {
        assert_eq!(Category::from_wire("tv"), Category::Tv);
        assert_eq!(Category::from_wire("cd"), Category::Cd);
        assert_eq!(Category::from_wire("handshake"), Category::Other);
        assert_eq!(Category::from_wire(""), Category::Other);
        assert_eq!(Category::from_wire("TV"), Category::Other);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Radio".parse::<Category>(), Ok(Category::Radio));
        assert!("handshake".parse::<Category>().is_err());
    }

    #[test]
    fn test_naive_date() {
        let s = sample();
        assert_eq!(s.naive_date(), NaiveDate::from_ymd_opt(2024, 1, 15));

        let mut bad = sample();
        bad.date = "2024-01-15".to_string();
        assert_eq!(bad.naive_date(), None);

        bad.date = "2024/2/30".to_string();
        assert_eq!(bad.naive_date(), None);
    }

    #[test]
    fn test_time_range_display() {
        let mut s = sample();
        assert_eq!(s.time_range_display(), "18:00〜");
        s.end_time = Some("20:00".to_string());
        assert_eq!(s.time_range_display(), "18:00〜20:00");
        s.start_time = None;
        assert_eq!(s.time_range_display(), "終日");
        assert!(s.is_all_day());
    }

    #[test]
    fn test_parse_clock() {
        let clock = |days, h, m| {
            Some(ClockTime {
                days,
                time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            })
        };
        assert_eq!(parse_clock("9:05"), clock(0, 9, 5));
        assert_eq!(parse_clock("18:00:00"), clock(0, 18, 0));
        assert_eq!(parse_clock("24:00"), clock(1, 0, 0));
        assert_eq!(parse_clock("25:30"), clock(1, 1, 30));
        assert_eq!(parse_clock("48:00"), None);
        assert_eq!(parse_clock("18:60"), None);
        assert_eq!(parse_clock("noon"), None);
    }

    fn at(day: u32, h: u32, m: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 1, day)?.and_hms_opt(h, m, 0)
    }

    #[test]
    fn test_late_night_times_carry_into_next_day() {
        let mut s = sample();
        s.start_time = Some("25:30".to_string());
        s.end_time = Some("26:00".to_string());
        assert_eq!(s.starts_at(), at(16, 1, 30));
        assert_eq!(s.ends_at(), at(16, 2, 0));
    }

    #[test]
    fn test_end_before_start_rolls_over() {
        let mut s = sample();
        s.start_time = Some("23:00".to_string());
        s.end_time = Some("01:00".to_string());
        assert_eq!(s.starts_at(), at(15, 23, 0));
        assert_eq!(s.ends_at(), at(16, 1, 0));

        s.end_time = Some("23:45".to_string());
        assert_eq!(s.ends_at(), at(15, 23, 45));

        s.start_time = None;
        assert_eq!(s.starts_at(), None);
        assert_eq!(s.ends_at(), None);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["category"], "tv");
        assert_eq!(json["startTime"], "18:00");
        assert!(json.get("endTime").is_none());
        assert_eq!(json["memberCodes"][0], "m1");
    }
}
