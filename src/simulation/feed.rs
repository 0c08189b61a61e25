//! External metering feed.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::Secret;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(u16),
    #[error("unexpected feed payload: {0}")]
    Payload(String),
}

/// Generation and load as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedSample {
    pub solar_kw: f64,
    pub wind_kw: f64,
    pub consumption_kw: f64,
    /// Feeds do not meter efficiency; the engine fills it in when absent.
    pub efficiency_pct: Option<f64>,
}

#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_reading(&self, api_key: &Secret) -> Result<FeedSample, FeedError>;
}

/// Emoncms `feed/list.json` client.
///
/// Feeds are picked by a case-insensitive name match. A feed that is missing
/// or non-numeric keeps its last known value.
pub struct EmoncmsFeed {
    client: Client,
    base_url: String,
    last_known: Mutex<FeedSample>,
}

impl EmoncmsFeed {
    pub const INITIAL_SAMPLE: FeedSample = FeedSample {
        solar_kw: 4.2,
        wind_kw: 1.8,
        consumption_kw: 6.5,
        efficiency_pct: None,
    };

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("gridtwin/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            last_known: Mutex::new(Self::INITIAL_SAMPLE),
        })
    }

    pub fn last_known(&self) -> FeedSample {
        *self.last_known.lock()
    }

    fn feed_value(feeds: &[Value], needle: &str) -> Option<f64> {
        let feed = feeds.iter().find(|feed| {
            feed.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_ascii_lowercase().contains(needle))
        })?;
        let value = match feed.get("value")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }
}

#[async_trait]
impl FeedProvider for EmoncmsFeed {
    async fn fetch_reading(&self, api_key: &Secret) -> Result<FeedSample, FeedError> {
        let url = format!("{}/feed/list.json", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", api_key.expose())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let feeds = match body {
            Value::Array(feeds) => feeds,
            other => {
                let message = other
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("expected a feed list");
                return Err(FeedError::Payload(message.to_string()));
            }
        };

        let mut last = self.last_known.lock();
        let sample = FeedSample {
            solar_kw: Self::feed_value(&feeds, "solar").unwrap_or(last.solar_kw),
            wind_kw: Self::feed_value(&feeds, "wind").unwrap_or(last.wind_kw),
            consumption_kw: Self::feed_value(&feeds, "consumption").unwrap_or(last.consumption_kw),
            efficiency_pct: None,
        };
        *last = sample;
        debug!(feeds = feeds.len(), solar_kw = sample.solar_kw, "feed sample fetched");
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed(server: &MockServer) -> EmoncmsFeed {
        EmoncmsFeed::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_matches_feeds_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/list.json"))
            .and(query_param("apikey", "k-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "House_Consumption", "value": 3.25 },
                { "id": 2, "name": "Roof SOLAR", "value": "5.5" },
                { "id": 3, "name": "wind_turbine", "value": 0.75 }
            ])))
            .mount(&server)
            .await;

        let sample = feed(&server).fetch_reading(&Secret::new("k-123")).await.unwrap();
        assert_eq!(sample.solar_kw, 5.5);
        assert_eq!(sample.wind_kw, 0.75);
        assert_eq!(sample.consumption_kw, 3.25);
        assert_eq!(sample.efficiency_pct, None);
    }

    #[tokio::test]
    async fn test_missing_feeds_keep_last_known_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 7, "name": "solar", "value": null },
                { "id": 8, "name": "wind", "value": 2.0 }
            ])))
            .mount(&server)
            .await;

        let client = feed(&server);
        let sample = client.fetch_reading(&Secret::new("demo")).await.unwrap();
        assert_eq!(sample.solar_kw, 4.2);
        assert_eq!(sample.wind_kw, 2.0);
        assert_eq!(sample.consumption_kw, 6.5);
        assert_eq!(client.last_known().wind_kw, 2.0);
    }

    #[tokio::test]
    async fn test_error_payload_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Username or password empty"
            })))
            .mount(&server)
            .await;

        let err = feed(&server).fetch_reading(&Secret::new("bad")).await.unwrap_err();
        assert!(matches!(err, FeedError::Payload(msg) if msg.contains("password")));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = feed(&server).fetch_reading(&Secret::new("demo")).await.unwrap_err();
        assert!(matches!(err, FeedError::Status(503)));
    }
}
