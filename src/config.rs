use anyhow::Result;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use validator::Validate;

use crate::domain::{BatteryParams, ProviderKeys, Secret, SimError, SimulationMode};
use crate::simulation::EngineSettings;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[validate(nested)]
    pub simulation: SimulationConfig,
    #[validate(nested)]
    pub history: HistoryConfig,
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub feed: FeedConfig,
    #[validate(nested)]
    pub weather: WeatherConfig,
    #[validate(nested)]
    pub query: QueryConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: SimulationMode,
    #[validate(range(min = 1))]
    pub tick_interval_ms: u64,
    /// IANA zone used for time-of-day patterns.
    pub timezone: String,
    pub random_seed: Option<u64>,
    /// Fill an empty history with demo readings on start.
    pub seed_sample_data: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Auto,
            tick_interval_ms: 5000,
            timezone: "UTC".to_string(),
            random_seed: None,
            seed_sample_data: false,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tz(&self) -> Result<Tz, SimError> {
        parse_tz("simulation.timezone", &self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    #[validate(range(min = 1))]
    pub max_in_memory: usize,
    pub max_persisted: usize,
    /// Directory for persisted state; unset or empty keeps it in memory.
    pub storage_dir: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_in_memory: 1000,
            max_persisted: 100,
            storage_dir: Some("data".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BatteryConfig {
    pub capacity_kwh: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub round_trip_efficiency: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub reserve_floor_pct: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub initial_level_pct: f64,
    /// Minutes of energy flow one tick represents.
    pub tick_energy_minutes: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 10.0,
            round_trip_efficiency: 0.9,
            reserve_floor_pct: 5.0,
            initial_level_pct: 78.0,
            tick_energy_minutes: 5.0,
        }
    }
}

impl BatteryConfig {
    pub fn params(&self) -> BatteryParams {
        BatteryParams {
            capacity_kwh: self.capacity_kwh,
            round_trip_efficiency: self.round_trip_efficiency,
            reserve_floor_pct: self.reserve_floor_pct,
            tick_hours: self.tick_energy_minutes / 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_key: Secret,
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://emoncms.org".to_string(),
            api_key: Secret::new("demo"),
            timeout_ms: 3000,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<Secret>,
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com".to_string(),
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueryConfig {
    /// Zone for calendar-date filters and the exported date/time columns.
    pub timezone: String,
    #[validate(range(min = 1, max = 1000))]
    pub default_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            default_page_size: 20,
        }
    }
}

impl QueryConfig {
    pub fn tz(&self) -> Result<Tz, SimError> {
        parse_tz("query.timezone", &self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: "exports".to_string(),
        }
    }
}

fn parse_tz(field: &str, name: &str) -> Result<Tz, SimError> {
    name.parse::<Tz>()
        .map_err(|e| SimError::ConfigurationInvalid(format!("{field}: unknown timezone {name:?}: {e}")))
}

impl Config {
    /// Defaults, then `config/default.toml` (or `$GRIDTWIN_CONFIG`), then
    /// `GRIDTWIN__SECTION__KEY` environment overrides.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("GRIDTWIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRIDTWIN__").split("__"));
        Ok(figment.extract()?)
    }

    /// Rejects out-of-range values before anything is started.
    pub fn check(&self) -> Result<(), SimError> {
        Validate::validate(self).map_err(|e| SimError::ConfigurationInvalid(e.to_string()))?;
        self.battery.params().validate()?;
        self.simulation.tz()?;
        self.query.tz()?;
        if self.history.max_persisted > self.history.max_in_memory {
            return Err(SimError::ConfigurationInvalid(format!(
                "history.max_persisted ({}) exceeds history.max_in_memory ({})",
                self.history.max_persisted, self.history.max_in_memory
            )));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, SimError> {
        self.check()?;
        Ok(EngineSettings {
            mode: self.simulation.mode,
            keys: ProviderKeys {
                feed_api_key: self.feed.api_key.clone(),
                weather_api_key: self.weather.api_key.clone(),
            },
            battery: self.battery.params(),
            initial_level_pct: self.battery.initial_level_pct,
            max_in_memory: self.history.max_in_memory,
            max_persisted: self.history.max_persisted,
            feed_timeout: self.feed.timeout(),
            timezone: self.simulation.tz()?,
            random_seed: self.simulation.random_seed,
            seed_sample_data: self.simulation.seed_sample_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        cfg.check().unwrap();
        assert_eq!(cfg.simulation.tick_interval(), Duration::from_secs(5));
        assert_eq!(cfg.history.max_in_memory, 1000);
        assert_eq!(cfg.history.max_persisted, 100);
        let params = cfg.battery.params();
        assert_eq!(params.capacity_kwh, 10.0);
        assert!((params.tick_hours - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_capacity_is_rejected() {
        let mut cfg = Config::default();
        cfg.battery.capacity_kwh = -10.0;
        assert!(matches!(cfg.check(), Err(SimError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_out_of_range_fields_are_rejected() {
        let mut cfg = Config::default();
        cfg.battery.reserve_floor_pct = 120.0;
        assert!(cfg.check().is_err());

        let mut cfg = Config::default();
        cfg.simulation.tick_interval_ms = 0;
        assert!(cfg.check().is_err());

        let mut cfg = Config::default();
        cfg.history.max_in_memory = 50;
        assert!(cfg.check().is_err(), "persisted tail larger than memory");

        let mut cfg = Config::default();
        cfg.query.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(cfg.check(), Err(SimError::ConfigurationInvalid(msg)) if msg.contains("query.timezone")));
    }

    #[test]
    fn test_engine_settings_carry_keys() {
        let mut cfg = Config::default();
        cfg.weather.api_key = Some(Secret::new("w"));
        cfg.simulation.timezone = "Asia/Kolkata".to_string();
        let settings = cfg.engine_settings().unwrap();
        assert_eq!(settings.keys.feed_api_key.expose(), "demo");
        assert_eq!(settings.keys.weather_api_key, Some(Secret::new("w")));
        assert_eq!(settings.timezone, chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GRIDTWIN__BATTERY__CAPACITY_KWH", "13.5");
            jail.set_env("GRIDTWIN__SIMULATION__MODE", "manual");
            let cfg = Config::load().expect("config loads");
            assert_eq!(cfg.battery.capacity_kwh, 13.5);
            assert_eq!(cfg.simulation.mode, SimulationMode::Manual);
            Ok(())
        });
    }
}
