//! Ambient conditions from Open-Meteo.
//!
//! Only the estimation flow reads weather; the simulation engine never does.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::{AmbientConditions, Secret};

const DEFAULT_IRRADIANCE_WM2: f64 = 0.0;
const DEFAULT_TEMPERATURE_C: f64 = 25.0;
const DEFAULT_WIND_SPEED_MS: f64 = 3.0;

#[async_trait]
pub trait AmbientProvider: Send + Sync {
    async fn fetch_ambient(&self, latitude: f64, longitude: f64) -> Result<AmbientConditions>;

    /// Replaces the credential used for subsequent requests.
    fn set_api_key(&self, _key: Option<Secret>) {}
}

/// Open-Meteo forecast client. Reads the first hourly slot.
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    api_key: RwLock<Option<Secret>>,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, api_key: Option<Secret>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("gridtwin/0.1"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: RwLock::new(api_key),
        })
    }

    fn url_for(&self, latitude: f64, longitude: f64) -> String {
        let mut url = format!(
            "{}/v1/forecast?latitude={:.4}&longitude={:.4}&hourly=shortwave_radiation,temperature_2m,windspeed_10m&timezone=auto",
            self.base_url.trim_end_matches('/'),
            latitude,
            longitude
        );
        if let Some(key) = self.api_key.read().as_ref().filter(|k| !k.is_empty()) {
            url.push_str("&apikey=");
            url.push_str(key.expose());
        }
        url
    }
}

#[async_trait]
impl AmbientProvider for OpenMeteoClient {
    async fn fetch_ambient(&self, latitude: f64, longitude: f64) -> Result<AmbientConditions> {
        debug!(latitude, longitude, "fetching ambient conditions");

        let resp = self
            .client
            .get(self.url_for(latitude, longitude))
            .send()
            .await
            .context("weather GET failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("weather API error: HTTP {status}");
        }
        let body: OpenMeteoResponse = resp.json().await.context("weather JSON parse failed")?;
        Ok(body.first_slot())
    }

    fn set_api_key(&self, key: Option<Secret>) {
        *self.api_key.write() = key;
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    hourly: Option<HourlySeries>,
}

#[derive(Debug, Default, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    shortwave_radiation: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m: Vec<Option<f64>>,
}

impl OpenMeteoResponse {
    fn first_slot(self) -> AmbientConditions {
        let hourly = self.hourly.unwrap_or_default();
        let first = |series: &[Option<f64>], default: f64| {
            series.first().copied().flatten().unwrap_or(default)
        };
        AmbientConditions {
            irradiance_wm2: first(&hourly.shortwave_radiation, DEFAULT_IRRADIANCE_WM2),
            temperature_c: first(&hourly.temperature_2m, DEFAULT_TEMPERATURE_C),
            wind_speed_ms: first(&hourly.windspeed_10m, DEFAULT_WIND_SPEED_MS),
        }
    }
}
