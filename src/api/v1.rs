use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use super::response::{success, ApiResponse};
use crate::{
    controller::AppState,
    domain::{
        BatteryOutcome, BatteryState, GenerationAssetConfig, ProviderKeys, Reading, Secret,
        SimulationMode, SiteLocation,
    },
    forecast::OutputEstimate,
    query::{AssetType, ExportFormat, Filter, DEFAULT_RECENT_HOURS},
    simulation::{FeedSample, ReadingSource},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/history/recent", get(get_recent))
        .route("/history/export", get(download_export).post(save_export))
        .route("/simulation/tick", post(simulation_tick))
        .route("/simulation/mode", put(set_mode))
        .route("/simulation/keys", put(set_keys))
        .route("/feed/probe", post(probe_feed))
        .route("/estimate", post(estimate))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub latest: Option<Reading>,
    pub battery: BatteryState,
    pub mode: SimulationMode,
    pub readings: usize,
}

pub async fn get_status(State(st): State<AppState>) -> ApiResponse<SystemStatus> {
    let status = st.controller.snapshot();
    success(SystemStatus {
        latest: status.history.latest().cloned(),
        battery: status.battery,
        mode: status.mode,
        readings: status.history.len(),
    })
}

/// Filter and paging parameters shared by the history routes.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct HistoryQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 8760))]
    pub window_hours: Option<u32>,
    #[serde(default)]
    pub asset_type: AssetType,
    #[validate(range(min = 1))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 1000))]
    pub page_size: Option<usize>,
}

impl HistoryQuery {
    fn filter(&self) -> Filter {
        Filter {
            start_date: self.start_date,
            end_date: self.end_date,
            window_hours: self.window_hours,
            asset_type: self.asset_type,
        }
    }
}

pub async fn get_history(
    State(st): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<ApiResponse<Vec<Reading>>, ApiError> {
    q.validate()?;
    let history = st.controller.snapshot().history;
    let filtered = st.query.filter(&history, &q.filter(), Utc::now());
    let page = st.query.paginate(
        &filtered.readings,
        q.page.unwrap_or(1),
        q.page_size.unwrap_or(st.cfg.query.default_page_size),
    );
    Ok(ApiResponse::paged(page).with_warnings(filtered.warning.as_ref()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecentQuery {
    #[validate(range(min = 1, max = 8760))]
    pub hours: Option<u32>,
}

pub async fn get_recent(
    State(st): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<ApiResponse<Vec<Reading>>, ApiError> {
    q.validate()?;
    let history = st.controller.snapshot().history;
    let hours = q.hours.unwrap_or(DEFAULT_RECENT_HOURS);
    Ok(success(st.query.recent(&history, hours, Utc::now())))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExportQuery {
    pub format: ExportFormat,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 8760))]
    pub window_hours: Option<u32>,
    #[serde(default)]
    pub asset_type: AssetType,
}

impl ExportQuery {
    fn filter(&self) -> Filter {
        Filter {
            start_date: self.start_date,
            end_date: self.end_date,
            window_hours: self.window_hours,
            asset_type: self.asset_type,
        }
    }
}

/// Returns the rendered file, or 204 when the selection is empty.
pub async fn download_export(
    State(st): State<AppState>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    q.validate()?;
    let now = Utc::now();
    let history = st.controller.snapshot().history;
    let filtered = st.query.filter(&history, &q.filter(), now);
    let Some(doc) = st.query.export(&filtered.readings, q.format, now)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let disposition = format!("attachment; filename=\"{}\"", doc.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, doc.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        doc.body,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct SavedExport {
    pub file_name: String,
    pub rows: usize,
}

/// Hands the rendered file to the configured export sink.
pub async fn save_export(
    State(st): State<AppState>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    q.validate()?;
    let now = Utc::now();
    let history = st.controller.snapshot().history;
    let filtered = st.query.filter(&history, &q.filter(), now);
    let Some(doc) = st.query.export(&filtered.readings, q.format, now)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    st.export_sink.deliver(&doc).await?;
    let saved = SavedExport {
        file_name: doc.file_name,
        rows: filtered.readings.len(),
    };
    Ok((StatusCode::CREATED, Json(success(saved))).into_response())
}

#[derive(Debug, Serialize)]
pub struct TickResult {
    pub reading: Reading,
    pub source: ReadingSource,
    pub battery_outcome: BatteryOutcome,
}

pub async fn simulation_tick(State(st): State<AppState>) -> ApiResponse<TickResult> {
    let report = st.controller.tick_now().await;
    success(TickResult {
        reading: report.reading,
        source: report.source,
        battery_outcome: report.outcome,
    })
    .with_warnings(&report.warnings)
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: SimulationMode,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: SimulationMode,
}

pub async fn set_mode(
    State(st): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> ApiResponse<ModeResponse> {
    let saved = st.controller.set_mode(req.mode).await;
    let response = success(ModeResponse { mode: req.mode });
    match saved {
        Ok(()) => response,
        Err(e) => response.with_warning(&e),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct KeysRequest {
    #[validate(length(min = 1, max = 256))]
    pub feed_api_key: String,
    #[validate(length(max = 256))]
    pub weather_api_key: Option<String>,
}

pub async fn set_keys(
    State(st): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    req.validate()?;
    let keys = ProviderKeys {
        feed_api_key: Secret::new(req.feed_api_key),
        weather_api_key: req
            .weather_api_key
            .filter(|k| !k.trim().is_empty())
            .map(Secret::new),
    };
    let response = success("updated");
    Ok(match st.controller.set_keys(keys).await {
        Ok(()) => response,
        Err(e) => response.with_warning(&e),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeRequest {
    pub api_key: Option<String>,
}

/// Connection test against the metering feed; records nothing.
pub async fn probe_feed(
    State(st): State<AppState>,
    body: Option<Json<ProbeRequest>>,
) -> Result<ApiResponse<FeedSample>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let key = req.api_key.filter(|k| !k.is_empty()).map(Secret::new);
    let sample = st.controller.probe_feed(key).await?;
    Ok(success(sample))
}

#[derive(Debug, Deserialize, Validate)]
pub struct EstimateRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 0.0))]
    pub rated_solar_kw: Option<f64>,
    #[validate(range(min = 0.0))]
    pub rated_wind_kw: Option<f64>,
    pub panel_count: Option<u32>,
    #[validate(range(min = 0.0))]
    pub panel_watts: Option<f64>,
    pub turbine_count: Option<u32>,
    #[validate(range(min = 0.0))]
    pub turbine_kw: Option<f64>,
}

impl EstimateRequest {
    /// Explicit ratings win over installation counts.
    fn assets(&self) -> GenerationAssetConfig {
        let installed = GenerationAssetConfig::from_installation(
            self.panel_count.unwrap_or(0),
            self.panel_watts.unwrap_or(0.0),
            self.turbine_count.unwrap_or(0),
            self.turbine_kw.unwrap_or(0.0),
        );
        GenerationAssetConfig {
            rated_solar_kw: self.rated_solar_kw.unwrap_or(installed.rated_solar_kw),
            rated_wind_kw: self.rated_wind_kw.unwrap_or(installed.rated_wind_kw),
        }
    }
}

pub async fn estimate(
    State(st): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> Result<ApiResponse<OutputEstimate>, ApiError> {
    req.validate()?;
    let site = SiteLocation {
        latitude: req.latitude,
        longitude: req.longitude,
    };
    let estimate = st.estimator.estimate(site, &req.assets()).await?;
    Ok(success(estimate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_assets_prefer_explicit_ratings() {
        let req = EstimateRequest {
            latitude: 10.0,
            longitude: 20.0,
            rated_solar_kw: None,
            rated_wind_kw: Some(3.0),
            panel_count: Some(20),
            panel_watts: Some(400.0),
            turbine_count: Some(2),
            turbine_kw: Some(5.0),
        };
        let assets = req.assets();
        assert_eq!(assets.rated_solar_kw, 8.0);
        assert_eq!(assets.rated_wind_kw, 3.0);
    }

    #[test]
    fn test_estimate_rejects_bad_latitude() {
        let req = EstimateRequest {
            latitude: 123.0,
            longitude: 0.0,
            rated_solar_kw: Some(5.0),
            rated_wind_kw: None,
            panel_count: None,
            panel_watts: None,
            turbine_count: None,
            turbine_kw: None,
        };
        assert!(req.validate().is_err());
    }
}
