//! Client for the schedule and member feeds.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use crate::config::Config;
use crate::models::wire::{parse_member_payload, parse_schedule_payload};
use crate::models::{Member, Schedule, YearMonth};

use super::jsonp::{HttpScriptLoader, JsonpClient, PendingRequest, ScriptLoader};
use super::ApiError;

/// Query parameter selecting the schedule month.
const MONTH_PARAM: &str = "dy";

/// Feed client. Both feeds share one `JsonpClient`, so with a fixed callback
/// name schedule and member requests are queued behind each other.
/// Clone is cheap and clones share the queue.
#[derive(Clone)]
pub struct FeedClient {
    jsonp: JsonpClient,
    schedule_url: String,
    member_url: String,
    schedule_timeout: Duration,
    member_timeout: Duration,
}

impl FeedClient {
    /// Create a client loading scripts over HTTP. Requires a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let loader = HttpScriptLoader::new()?;
        Ok(Self::with_loader(config, Arc::new(loader)))
    }

    pub fn with_loader(config: &Config, loader: Arc<dyn ScriptLoader>) -> Self {
        Self {
            jsonp: JsonpClient::new(loader, config.jsonp_options()),
            schedule_url: config.schedule_url.clone(),
            member_url: config.member_url.clone(),
            schedule_timeout: config.schedule_timeout(),
            member_timeout: config.member_timeout(),
        }
    }

    pub fn schedule_request_url(&self, ym: YearMonth) -> Result<String, ApiError> {
        let mut url = Url::parse(&self.schedule_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", self.schedule_url, e)))?;
        url.query_pairs_mut().append_pair(MONTH_PARAM, &ym.to_string());
        Ok(url.into())
    }

    /// Queue a schedule request without waiting for it.
    pub fn submit_schedules(&self, ym: YearMonth) -> Result<PendingRequest, ApiError> {
        let url = self.schedule_request_url(ym)?;
        Ok(self.jsonp.submit(&url, self.schedule_timeout))
    }

    pub async fn fetch_schedules(&self, ym: YearMonth) -> Result<Vec<Schedule>, ApiError> {
        let payload = self.submit_schedules(ym)?.response().await?;
        let schedules = parse_schedule_payload(&payload);
        debug!(month = %ym, count = schedules.len(), "Fetched schedules");
        Ok(schedules)
    }

    pub async fn fetch_members(&self) -> Result<Vec<Member>, ApiError> {
        let payload = self.jsonp.request(&self.member_url, self.member_timeout).await?;
        let members = parse_member_payload(&payload);
        debug!(count = members.len(), "Fetched members");
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{envelope, member_item, schedule_item, test_config, FakeFeed, Reply};
    use crate::models::Category;
    use serde_json::json;

    #[tokio::test]
    async fn test_schedule_request_url() {
        let client = FeedClient::with_loader(&test_config(), FakeFeed::new());
        let ym = YearMonth::new(2024, 1).unwrap();
        assert_eq!(
            client.schedule_request_url(ym).unwrap(),
            "https://feed.test/api/list/schedule?dy=202401"
        );
    }

    #[tokio::test]
    async fn test_fetch_schedules() {
        let feed = FakeFeed::new();
        feed.set_schedules(
            "202401",
            Reply::Payload(envelope(json!([schedule_item("s1", "2024/01/15", "tv", &["m1", "m2"])]))),
        );
        let client = FeedClient::with_loader(&test_config(), feed.clone());

        let schedules = client.fetch_schedules(YearMonth::new(2024, 1).unwrap()).await.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].category, Category::Tv);
        assert_eq!(schedules[0].member_codes, vec!["m1", "m2"]);
        assert_eq!(
            feed.calls(),
            vec!["https://feed.test/api/list/schedule?dy=202401&callback=res"]
        );
    }

    #[tokio::test]
    async fn test_fetch_members_tolerates_missing_data() {
        let feed = FakeFeed::new();
        feed.set_members(Reply::Payload(json!({ "count": "0" })));
        let client = FeedClient::with_loader(&test_config(), feed.clone());
        assert!(client.fetch_members().await.unwrap().is_empty());

        feed.set_members(Reply::Payload(envelope(json!([member_item("m1", "A", "5期生", false)]))));
        let members = client.fetch_members().await.unwrap();
        assert_eq!(members[0].code, "m1");
        assert_eq!(feed.member_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let config = Config {
            schedule_url: "::not a url::".to_string(),
            ..test_config()
        };
        let client = FeedClient::with_loader(&config, FakeFeed::new());
        let err = client.fetch_schedules(YearMonth::new(2024, 1).unwrap()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
