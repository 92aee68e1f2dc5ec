//! iCalendar (RFC 5545) export.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::models::Schedule;
use crate::utils::{html_to_text, strip_html};

const PRODID: &str = "-//Nogizaka46 Schedule Viewer//NONSGML v1.0//JP";
const CALENDAR_NAME: &str = "乃木坂46 スケジュール";
const TIMEZONE: &str = "Asia/Tokyo";
const UID_DOMAIN: &str = "nogizaka46-schedule";

/// Content lines longer than this are folded.
const MAX_LINE_CHARS: usize = 75;

const LINE_ENDING: &str = "\r\n";

/// Escape TEXT property values.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Split a content line into 75-character pieces; continuation lines start
/// with a single space.
fn fold_line(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= MAX_LINE_CHARS {
        return line.to_string();
    }

    let (first, mut rest) = chars.split_at(MAX_LINE_CHARS);
    let mut folded: Vec<String> = vec![first.iter().collect()];
    while !rest.is_empty() {
        let take = rest.len().min(MAX_LINE_CHARS - 1);
        let (piece, tail) = rest.split_at(take);
        folded.push(format!(" {}", piece.iter().collect::<String>()));
        rest = tail;
    }
    folded.join(LINE_ENDING)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn format_local(at: NaiveDateTime) -> String {
    at.format("%Y%m%dT%H%M%S").to_string()
}

fn push_event(lines: &mut Vec<String>, schedule: &Schedule, date: NaiveDate, stamp: &str) {
    lines.push("BEGIN:VEVENT".to_string());
    lines.push(format!("UID:{}@{}", schedule.code, UID_DOMAIN));
    lines.push(format!("DTSTAMP:{}", stamp));

    match schedule.starts_at() {
        Some(start) => {
            lines.push(format!("DTSTART;TZID={}:{}", TIMEZONE, format_local(start)));
            if let Some(end) = schedule.ends_at() {
                lines.push(format!("DTEND;TZID={}:{}", TIMEZONE, format_local(end)));
            }
        }
        None => {
            if let Some(start) = schedule.start_time.as_deref() {
                warn!(code = %schedule.code, start, "Unreadable start time, exporting as all-day");
            }
            lines.push(format!("DTSTART;VALUE=DATE:{}", format_date(date)));
        }
    }

    lines.push(fold_line(&format!("SUMMARY:{}", escape_text(&strip_html(&schedule.title)))));

    if let Some(description) = schedule.description.as_deref() {
        let text = html_to_text(description);
        if !text.is_empty() {
            lines.push(fold_line(&format!("DESCRIPTION:{}", escape_text(&text))));
        }
    }

    if let Some(link) = schedule.link.as_deref() {
        lines.push(fold_line(&format!("URL:{}", link)));
    }

    lines.push(format!("CATEGORIES:{}", escape_text(schedule.category.label())));
    lines.push("END:VEVENT".to_string());
}

/// Render `schedules` as an iCalendar document, one VEVENT per schedule.
///
/// Output depends only on the input and `stamp` (used for every DTSTAMP).
/// Schedules without a start time become all-day events. Entries whose date
/// cannot be parsed are skipped.
pub fn generate_ical(schedules: &[Schedule], stamp: NaiveDateTime) -> String {
    let stamp = stamp.format("%Y%m%dT%H%M%S").to_string();
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        format!("X-WR-CALNAME:{}", CALENDAR_NAME),
        format!("X-WR-TIMEZONE:{}", TIMEZONE),
    ];

    for schedule in schedules {
        match schedule.naive_date() {
            Some(date) => push_event(&mut lines, schedule, date, &stamp),
            None => warn!(code = %schedule.code, date = %schedule.date, "Skipping schedule with unparseable date"),
        }
    }

    lines.push("END:VCALENDAR".to_string());
    lines.join(LINE_ENDING)
}

/// "nogizaka46-schedule-2024-01-15.ics"
pub fn default_filename(date: NaiveDate) -> String {
    format!("nogizaka46-schedule-{}.ics", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(9, 5, 30)
            .unwrap()
    }

    fn schedule(code: &str, start: Option<&str>, end: Option<&str>) -> Schedule {
        Schedule {
            code: code.to_string(),
            title: "TV番組A".to_string(),
            date: "2024/01/15".to_string(),
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
            category: Category::Tv,
            description: None,
            link: None,
            member_codes: vec![],
        }
    }

    #[test]
    fn test_calendar_envelope() {
        let ics = generate_ical(&[], stamp());
        let lines: Vec<&str> = ics.split("\r\n").collect();
        assert_eq!(lines.first(), Some(&"BEGIN:VCALENDAR"));
        assert_eq!(lines.last(), Some(&"END:VCALENDAR"));
        assert!(lines.contains(&"PRODID:-//Nogizaka46 Schedule Viewer//NONSGML v1.0//JP"));
        assert!(lines.contains(&"X-WR-TIMEZONE:Asia/Tokyo"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn test_timed_event() {
        let mut s = schedule("100", Some("18:00"), Some("20:30"));
        s.link = Some("https://example.com/s/100".to_string());
        let ics = generate_ical(&[s], stamp());

        assert!(ics.contains("UID:100@nogizaka46-schedule\r\n"));
        assert!(ics.contains("DTSTAMP:20240110T090530\r\n"));
        assert!(ics.contains("DTSTART;TZID=Asia/Tokyo:20240115T180000\r\n"));
        assert!(ics.contains("DTEND;TZID=Asia/Tokyo:20240115T203000\r\n"));
        assert!(ics.contains("SUMMARY:TV番組A\r\n"));
        assert!(ics.contains("URL:https://example.com/s/100\r\n"));
        assert!(ics.contains("CATEGORIES:TV\r\n"));
    }

    #[test]
    fn test_all_day_event_has_no_end() {
        let ics = generate_ical(&[schedule("200", None, Some("20:00"))], stamp());
        assert!(ics.contains("DTSTART;VALUE=DATE:20240115\r\n"));
        assert!(!ics.contains("DTEND"));
    }

    #[test]
    fn test_start_without_end() {
        let ics = generate_ical(&[schedule("300", Some("9:00"), None)], stamp());
        assert!(ics.contains("DTSTART;TZID=Asia/Tokyo:20240115T090000"));
        assert!(!ics.contains("DTEND"));
    }

    #[test]
    fn test_late_night_slot_stays_timed() {
        let ics = generate_ical(&[schedule("500", Some("25:30"), Some("26:00"))], stamp());
        assert!(!ics.contains("VALUE=DATE"));
        assert!(ics.contains("DTSTART;TZID=Asia/Tokyo:20240116T013000\r\n"));
        assert!(ics.contains("DTEND;TZID=Asia/Tokyo:20240116T020000\r\n"));
    }

    #[test]
    fn test_end_past_midnight_follows_start() {
        let ics = generate_ical(&[schedule("600", Some("23:00"), Some("01:00"))], stamp());
        assert!(ics.contains("DTSTART;TZID=Asia/Tokyo:20240115T230000\r\n"));
        assert!(ics.contains("DTEND;TZID=Asia/Tokyo:20240116T010000\r\n"));
    }

    #[test]
    fn test_one_event_per_schedule_and_deterministic() {
        let mut bad = schedule("bad", None, None);
        bad.date = "soon".to_string();
        let schedules = vec![schedule("1", None, None), bad, schedule("2", Some("10:00"), None)];

        let ics = generate_ical(&schedules, stamp());
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(ics, generate_ical(&schedules, stamp()));
    }

    #[test]
    fn test_text_is_stripped_and_escaped() {
        let mut s = schedule("400", None, None);
        s.title = "Live; Tokyo, <b>Day 1</b> &amp; 2".to_string();
        s.description = Some("<p>Line one</p><p>a\\b</p>".to_string());
        s.category = Category::Cd;
        let ics = generate_ical(&[s], stamp());

        assert!(ics.contains("SUMMARY:Live\\; Tokyo\\, Day 1 & 2\r\n"));
        assert!(ics.contains("DESCRIPTION:Line one\\n\\na\\\\b\r\n"));
        assert!(ics.contains("CATEGORIES:CD/音楽\r\n"));
    }

    #[test]
    fn test_long_lines_are_folded() {
        let line = format!("SUMMARY:{}", "あ".repeat(200));
        let folded = fold_line(&line);
        let parts: Vec<&str> = folded.split("\r\n").collect();

        assert_eq!(parts[0].chars().count(), 75);
        assert!(parts[1..].iter().all(|p| p.starts_with(' ') && p.chars().count() <= 75));
        let rejoined: String = parts
            .iter()
            .enumerate()
            .map(|(i, p)| if i == 0 { *p } else { &p[1..] })
            .collect();
        assert_eq!(rejoined, line);

        assert_eq!(fold_line("SHORT:x"), "SHORT:x");
    }

    #[test]
    fn test_default_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(default_filename(date), "nogizaka46-schedule-2024-01-05.ics");
    }
}
