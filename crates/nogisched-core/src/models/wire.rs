//! Feed payload types and their conversion into domain models.
//!
//! Everything shaped by the remote API stays in this module. The feed is
//! loosely typed (numbers where strings are expected, nested member-code
//! arrays, missing `data`), so parsing is lenient: a bad envelope yields an
//! empty list and a bad item is skipped, never an error.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Category, Generation, Member, Schedule};

/// One entry of the schedule feed's `data` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleApiItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    /// "YYYY/MM/DD"
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cate: String,
    /// HTML fragment
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link: String,
    /// Member codes, usually `[["code"], ["code"]]`
    #[serde(default)]
    pub arti_code: Value,
}

/// One entry of the member feed's `data` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberApiItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub english_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub kana: String,
    /// Generation label, e.g. "5期生"
    #[serde(default, deserialize_with = "lenient_string")]
    pub cate: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub img: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link: String,
    /// "YES" or "NO"
    #[serde(default, deserialize_with = "lenient_string")]
    pub graduation: String,
}

/// Accept strings, numbers and booleans as text; anything else becomes "".
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Flatten `arti_code` into an ordered list, dropping falsy entries.
///
/// Non-array input means no member information.
pub fn flatten_member_codes(codes: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::String(s) if !s.is_empty() => out.push(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => out.push(n.to_string()),
            _ => {}
        }
    }

    let mut out = Vec::new();
    if codes.is_array() {
        walk(codes, &mut out);
    }
    out
}

pub fn map_schedule(api: &ScheduleApiItem) -> Schedule {
    Schedule {
        code: api.code.clone(),
        title: api.title.clone(),
        date: api.date.clone(),
        start_time: non_empty(&api.start_time),
        end_time: non_empty(&api.end_time),
        category: Category::from_wire(&api.cate),
        description: non_empty(&api.text),
        link: non_empty(&api.link),
        member_codes: flatten_member_codes(&api.arti_code),
    }
}

pub fn map_member(api: &MemberApiItem) -> Member {
    Member {
        code: api.code.clone(),
        name: api.name.clone(),
        english_name: non_empty(&api.english_name),
        kana: non_empty(&api.kana),
        generation: Generation::from_wire(&api.cate),
        image_url: non_empty(&api.img),
        profile_link: non_empty(&api.link),
        is_graduated: api.graduation == "YES",
    }
}

/// Return the `data` array of a feed envelope, or `None` if it is missing
/// or not an array.
fn data_items<'a>(payload: &'a Value, feed: &str) -> Option<&'a Vec<Value>> {
    match payload.get("data") {
        Some(Value::Array(items)) => {
            if let Some(count) = payload.get("count") {
                debug!(feed, count = %count, items = items.len(), "Feed envelope parsed");
            }
            Some(items)
        }
        Some(other) => {
            warn!(feed, kind = value_kind(other), "Feed `data` is not an array, treating as empty");
            None
        }
        None => {
            debug!(feed, "Feed payload has no `data`, treating as empty");
            None
        }
    }
}

fn parse_items<'a, T, U>(payload: &'a Value, feed: &str, map: impl Fn(&T) -> U) -> Vec<U>
where
    T: Deserialize<'a>,
{
    let Some(items) = data_items(payload, feed) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(api) => Some(map(&api)),
            Err(e) => {
                warn!(feed, index, error = %e, "Skipping malformed feed item");
                None
            }
        })
        .collect()
}

/// Parse a schedule feed payload into schedules, preserving feed order.
pub fn parse_schedule_payload(payload: &Value) -> Vec<Schedule> {
    parse_items(payload, "schedule", map_schedule)
}

/// Parse a member feed payload into members, preserving feed order.
pub fn parse_member_payload(payload: &Value) -> Vec<Member> {
    parse_items(payload, "member", map_member)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_schedule_full_item() {
        let payload = json!({
            "count": "1",
            "data": [{
                "code": "s100",
                "title": "TV番組A",
                "date": "2024/01/15",
                "start_time": "18:00",
                "end_time": "",
                "cate": "tv",
                "text": "<p>Live at <b>Tokyo</b></p>",
                "link": "",
                "arti_code": [["m1"], ["m2"]]
            }]
        });

        let schedules = parse_schedule_payload(&payload);
        assert_eq!(schedules.len(), 1);
        let s = &schedules[0];
        assert_eq!(s.code, "s100");
        assert_eq!(s.date, "2024/01/15");
        assert_eq!(s.start_time.as_deref(), Some("18:00"));
        assert_eq!(s.end_time, None);
        assert_eq!(s.link, None);
        assert_eq!(s.category, Category::Tv);
        assert_eq!(s.member_codes, vec!["m1", "m2"]);
    }

    #[test]
    fn test_unknown_category_becomes_other() {
        let api = ScheduleApiItem {
            cate: "handshake".to_string(),
            ..Default::default()
        };
        assert_eq!(map_schedule(&api).category, Category::Other);
    }

    #[test]
    fn test_flatten_member_codes_irregular() {
        let codes = json!([["m1", ""], "m2", [["m3"]], null, [], 0, 55]);
        assert_eq!(flatten_member_codes(&codes), vec!["m1", "m2", "m3", "55"]);
        assert!(flatten_member_codes(&json!("m1")).is_empty());
        assert!(flatten_member_codes(&Value::Null).is_empty());
    }

    #[test]
    fn test_map_member_defaults() {
        let payload = json!({
            "count": "2",
            "data": [
                {
                    "code": 55387,
                    "name": "山田 花子",
                    "english_name": "Hanako Yamada",
                    "kana": "",
                    "cate": "5期生",
                    "img": "https://example.com/a.jpg",
                    "link": "",
                    "graduation": "NO"
                },
                {
                    "code": "48010",
                    "name": "佐藤 一美",
                    "cate": "研究生",
                    "graduation": "YES"
                }
            ]
        });

        let members = parse_member_payload(&payload);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].code, "55387");
        assert_eq!(members[0].generation, Generation::Fifth);
        assert_eq!(members[0].english_name.as_deref(), Some("Hanako Yamada"));
        assert_eq!(members[0].kana, None);
        assert_eq!(members[0].profile_link, None);
        assert!(!members[0].is_graduated);
        assert_eq!(members[1].generation, Generation::Sixth);
        assert!(members[1].is_graduated);
    }

    #[test]
    fn test_malformed_envelopes_are_empty() {
        assert!(parse_schedule_payload(&json!({})).is_empty());
        assert!(parse_schedule_payload(&json!({"data": "oops"})).is_empty());
        assert!(parse_schedule_payload(&json!(null)).is_empty());
        assert!(parse_member_payload(&json!({"count": "0", "data": null})).is_empty());
    }

    #[test]
    fn test_malformed_items_are_skipped() {
        let payload = json!({"data": ["not an object", {"code": "ok", "title": "t"}]});
        let schedules = parse_schedule_payload(&payload);
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].code, "ok");
        assert!(schedules[0].member_codes.is_empty());
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let api = ScheduleApiItem {
            code: "x".to_string(),
            cate: "radio".to_string(),
            arti_code: json!([["a"]]),
            ..Default::default()
        };
        assert_eq!(map_schedule(&api), map_schedule(&api));
    }
}
