use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One observation of the simulated asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub solar_kw: f64,
    pub wind_kw: f64,
    pub consumption_kw: f64,
    /// Positive = import from grid, negative = export.
    pub grid_import_kw: f64,
    pub battery_level_pct: f64,
    pub efficiency_pct: f64,
}

impl Reading {
    pub fn net_power_kw(&self) -> f64 {
        self.solar_kw + self.wind_kw - self.consumption_kw
    }
}

/// Source the engine draws each tick's generation and load from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SimulationMode {
    /// Time-of-day aware synthetic profile.
    #[default]
    Auto,
    /// Uniform random values, independent of the clock.
    Manual,
    /// Live metering feed with manual fallback.
    #[serde(alias = "api")]
    #[strum(to_string = "external", serialize = "api")]
    External,
}

/// Opaque provider credential. Never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Credentials for the external providers, persisted alongside the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub feed_api_key: Secret,
    #[serde(default)]
    pub weather_api_key: Option<Secret>,
}

/// Geographic position of the estimated site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Rated capacities of the generation assets at a site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationAssetConfig {
    pub rated_solar_kw: f64,
    pub rated_wind_kw: f64,
}

impl GenerationAssetConfig {
    /// Builds the asset set from installed hardware counts.
    pub fn from_installation(
        panel_count: u32,
        panel_watts: f64,
        turbine_count: u32,
        turbine_kw: f64,
    ) -> Self {
        Self {
            rated_solar_kw: solar_array_capacity_kw(panel_count, panel_watts),
            rated_wind_kw: wind_farm_capacity_kw(turbine_count, turbine_kw),
        }
    }
}

/// Rated array size from panel count and per-panel wattage.
pub fn solar_array_capacity_kw(panel_count: u32, panel_watts: f64) -> f64 {
    (f64::from(panel_count) * panel_watts.max(0.0)) / 1000.0
}

/// Rated wind capacity from turbine count and per-turbine rating.
pub fn wind_farm_capacity_kw(turbine_count: u32, turbine_kw: f64) -> f64 {
    f64::from(turbine_count) * turbine_kw.max(0.0)
}

/// Ambient conditions consumed by the power model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientConditions {
    pub irradiance_wm2: f64,
    pub temperature_c: f64,
    pub wind_speed_ms: f64,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing_accepts_legacy_api_name() {
        assert_eq!("api".parse::<SimulationMode>().unwrap(), SimulationMode::External);
        assert_eq!("AUTO".parse::<SimulationMode>().unwrap(), SimulationMode::Auto);
        assert_eq!(SimulationMode::External.to_string(), "external");

        let mode: SimulationMode = serde_json::from_str("\"api\"").unwrap();
        assert_eq!(mode, SimulationMode::External);
    }

    #[test]
    fn test_secret_is_redacted() {
        let key = Secret::new("super-secret-key");
        assert_eq!(format!("{key}"), "***");
        assert_eq!(format!("{key:?}"), "Secret(***)");
        assert_eq!(key.expose(), "super-secret-key");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"super-secret-key\"");
    }

    #[test]
    fn test_capacity_helpers() {
        assert_eq!(solar_array_capacity_kw(20, 400.0), 8.0);
        assert_eq!(wind_farm_capacity_kw(2, 5.0), 10.0);
        let assets = GenerationAssetConfig::from_installation(10, 350.0, 1, 3.0);
        assert_eq!(assets.rated_solar_kw, 3.5);
        assert_eq!(assets.rated_wind_kw, 3.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(4.236, 2), 4.24);
        assert_eq!(round_to(78.04, 1), 78.0);
    }
}
