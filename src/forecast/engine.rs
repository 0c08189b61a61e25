use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{estimate_solar_kw, estimate_wind_kw, AmbientProvider};
use crate::domain::{AmbientConditions, GenerationAssetConfig, Secret, SimError, SiteLocation};

/// Output estimate for a site under current ambient conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputEstimate {
    pub site: SiteLocation,
    pub ambient: AmbientConditions,
    pub solar_kw: f64,
    pub wind_kw: f64,
    pub total_kw: f64,
}

impl OutputEstimate {
    pub fn from_ambient(
        site: SiteLocation,
        assets: &GenerationAssetConfig,
        ambient: AmbientConditions,
    ) -> Self {
        let solar_kw = estimate_solar_kw(
            ambient.irradiance_wm2,
            assets.rated_solar_kw,
            ambient.temperature_c,
        );
        let wind_kw = estimate_wind_kw(ambient.wind_speed_ms, assets.rated_wind_kw);
        Self {
            site,
            ambient,
            solar_kw,
            wind_kw,
            total_kw: solar_kw + wind_kw,
        }
    }
}

/// Weather-driven estimation flow: fetch ambient, apply the power curves.
pub struct EstimationService {
    ambient: Arc<dyn AmbientProvider>,
}

impl EstimationService {
    pub fn new(ambient: Arc<dyn AmbientProvider>) -> Self {
        Self { ambient }
    }

    pub async fn estimate(
        &self,
        site: SiteLocation,
        assets: &GenerationAssetConfig,
    ) -> Result<OutputEstimate, SimError> {
        let ambient = self
            .ambient
            .fetch_ambient(site.latitude, site.longitude)
            .await
            .map_err(|e| {
                warn!(error = %e, "ambient fetch failed");
                SimError::ProviderUnavailable(format!("{e:#}"))
            })?;

        let estimate = OutputEstimate::from_ambient(site, assets, ambient);
        info!(
            latitude = site.latitude,
            longitude = site.longitude,
            irradiance_wm2 = ambient.irradiance_wm2,
            solar_kw = estimate.solar_kw,
            wind_kw = estimate.wind_kw,
            "output estimated"
        );
        Ok(estimate)
    }

    pub fn set_api_key(&self, key: Option<Secret>) {
        self.ambient.set_api_key(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedAmbient(AmbientConditions);

    #[async_trait]
    impl AmbientProvider for FixedAmbient {
        async fn fetch_ambient(&self, _lat: f64, _lon: f64) -> Result<AmbientConditions> {
            Ok(self.0)
        }
    }

    struct Offline;

    #[async_trait]
    impl AmbientProvider for Offline {
        async fn fetch_ambient(&self, _lat: f64, _lon: f64) -> Result<AmbientConditions> {
            anyhow::bail!("connection refused")
        }
    }

    fn jaipur() -> SiteLocation {
        SiteLocation {
            latitude: 26.9124,
            longitude: 75.7873,
        }
    }

    #[tokio::test]
    async fn test_estimate_combines_both_curves() {
        let service = EstimationService::new(Arc::new(FixedAmbient(AmbientConditions {
            irradiance_wm2: 1000.0,
            temperature_c: 25.0,
            wind_speed_ms: 12.0,
        })));
        let assets = GenerationAssetConfig {
            rated_solar_kw: 5.0,
            rated_wind_kw: 3.0,
        };
        let est = service.estimate(jaipur(), &assets).await.unwrap();
        assert!((est.solar_kw - 4.0).abs() < 1e-9);
        assert_eq!(est.wind_kw, 3.0);
        assert!((est.total_kw - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_provider_unavailable() {
        let service = EstimationService::new(Arc::new(Offline));
        let err = service
            .estimate(jaipur(), &GenerationAssetConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::ProviderUnavailable(msg) if msg.contains("connection refused")));
    }
}
