//! In-memory feed used by tests across the crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};

use super::{ApiError, ScriptLoader};
use crate::config::Config;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Payload(Value),
    Fail,
    Hang,
}

/// Serves both feeds from canned replies, answering through whatever
/// callback name the request carries. Schedule requests are told apart by
/// their `dy` parameter.
#[derive(Default)]
pub(crate) struct FakeFeed {
    schedules: Mutex<HashMap<String, Reply>>,
    members: Mutex<Option<Reply>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFeed {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_schedules(&self, dy: &str, reply: Reply) {
        self.schedules.lock().unwrap().insert(dy.to_string(), reply);
    }

    pub(crate) fn set_members(&self, reply: Reply) {
        *self.members.lock().unwrap() = Some(reply);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn schedule_calls(&self, dy: &str) -> usize {
        let needle = format!("dy={}", dy);
        self.calls().iter().filter(|url| url.contains(&needle)).count()
    }

    pub(crate) fn member_calls(&self) -> usize {
        self.calls().iter().filter(|url| !url.contains("dy=")).count()
    }

    fn reply_for(&self, url: &Url) -> Option<Reply> {
        match url.query_pairs().find(|(k, _)| k == "dy") {
            Some((_, dy)) => self.schedules.lock().unwrap().get(dy.as_ref()).cloned(),
            None => self.members.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl ScriptLoader for FakeFeed {
    async fn load(&self, url: &Url) -> Result<String, ApiError> {
        self.calls.lock().unwrap().push(url.to_string());
        let callback = url
            .query_pairs()
            .find(|(k, _)| k == "callback")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        match self.reply_for(url) {
            Some(Reply::Payload(payload)) => Ok(format!("{}({});", callback, payload)),
            Some(Reply::Fail) | None => Err(ApiError::Network("connection refused".to_string())),
            Some(Reply::Hang) => futures::future::pending().await,
        }
    }
}

pub(crate) fn envelope(items: Value) -> Value {
    let count = items.as_array().map(|a| a.len()).unwrap_or(0);
    json!({ "count": count.to_string(), "data": items })
}

pub(crate) fn schedule_item(code: &str, date: &str, cate: &str, members: &[&str]) -> Value {
    let arti_code: Vec<Vec<&str>> = members.iter().map(|m| vec![*m]).collect();
    json!({
        "code": code,
        "title": format!("Schedule {}", code),
        "date": date,
        "start_time": "18:00",
        "end_time": "",
        "cate": cate,
        "text": "",
        "link": "",
        "arti_code": arti_code,
    })
}

pub(crate) fn member_item(code: &str, name: &str, cate: &str, graduated: bool) -> Value {
    json!({
        "code": code,
        "name": name,
        "english_name": "",
        "kana": "",
        "cate": cate,
        "img": "",
        "link": "",
        "graduation": if graduated { "YES" } else { "NO" },
    })
}

pub(crate) fn test_config() -> Config {
    Config {
        schedule_url: "https://feed.test/api/list/schedule".to_string(),
        member_url: "https://feed.test/api/list/member".to_string(),
        ..Config::default()
    }
}
