use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{BatteryState, ProviderKeys, Secret, SimError, SimulationMode};
use crate::forecast::{EstimationService, OpenMeteoClient};
use crate::query::{ExportSink, FileSink, QueryEngine};
use crate::repo::{persistence_for, HistorySnapshot};
use crate::simulation::{
    EmoncmsFeed, EnginePorts, FeedSample, SimulationEngine, TickReport,
};

/// What readers see of the engine without locking it.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub history: HistorySnapshot,
    pub battery: BatteryState,
    pub mode: SimulationMode,
}

impl StatusSnapshot {
    fn of(engine: &SimulationEngine) -> Self {
        Self {
            history: engine.snapshot(),
            battery: engine.battery_state(),
            mode: engine.mode(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub controller: Arc<SimulationController>,
    pub estimator: Arc<EstimationService>,
    pub query: QueryEngine,
    pub export_sink: Arc<dyn ExportSink>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let settings = cfg.engine_settings()?;

        let feed = EmoncmsFeed::new(cfg.feed.base_url.clone(), cfg.feed.timeout())
            .context("building feed client")?;
        let ports = EnginePorts::new(persistence_for(&cfg.history)).with_feed(Arc::new(feed));
        let engine = SimulationEngine::start(settings, ports).await?;
        if let Some(warning) = engine.restore_warning() {
            warn!(error = %warning, "starting with empty history");
        }

        let ambient = OpenMeteoClient::new(
            cfg.weather.base_url.clone(),
            cfg.weather.timeout(),
            engine.keys().weather_api_key.clone(),
        )
        .context("building weather client")?;
        let estimator = Arc::new(EstimationService::new(Arc::new(ambient)));
        let export_sink: Arc<dyn ExportSink> = Arc::new(FileSink::new(cfg.export.dir.clone()));

        Self::from_parts(cfg, engine, estimator, export_sink)
    }

    /// Wires already-built parts together.
    pub fn from_parts(
        cfg: Config,
        engine: SimulationEngine,
        estimator: Arc<EstimationService>,
        export_sink: Arc<dyn ExportSink>,
    ) -> Result<Self> {
        let query = QueryEngine::new(cfg.query.tz()?);
        let controller = Arc::new(SimulationController::new(engine, estimator.clone()));
        Ok(Self {
            cfg,
            controller,
            estimator,
            query,
            export_sink,
        })
    }
}

/// Starts the tick loop; it stops when `cancel` fires.
pub fn spawn_controller_tasks(state: &AppState, cancel: CancellationToken) -> JoinHandle<()> {
    let controller = state.controller.clone();
    let interval = state.cfg.simulation.tick_interval();
    tokio::spawn(async move {
        controller.run(interval, cancel).await;
    })
}

/// Owns the engine and serializes every mutation of it.
pub struct SimulationController {
    engine: Mutex<SimulationEngine>,
    status: watch::Sender<StatusSnapshot>,
    estimator: Arc<EstimationService>,
}

impl SimulationController {
    pub fn new(engine: SimulationEngine, estimator: Arc<EstimationService>) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::of(&engine));
        Self {
            engine: Mutex::new(engine),
            status,
            estimator,
        }
    }

    pub async fn run(&self, every: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "simulation loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.tick_now().await;
                    for warning in &report.warnings {
                        debug!(error = %warning, "tick completed with warning");
                    }
                }
            }
        }
        info!("simulation loop stopped");
    }

    pub async fn tick_now(&self) -> TickReport {
        let mut engine = self.engine.lock().await;
        let report = engine.tick().await;
        self.publish(&engine);
        report
    }

    /// Applies the mode; `Err` means it was not persisted.
    pub async fn set_mode(&self, mode: SimulationMode) -> Result<(), SimError> {
        let mut engine = self.engine.lock().await;
        let saved = engine.set_mode(mode).await;
        self.publish(&engine);
        saved
    }

    /// Applies the keys to the engine and the estimator; `Err` means they
    /// were not persisted.
    pub async fn set_keys(&self, keys: ProviderKeys) -> Result<(), SimError> {
        self.estimator.set_api_key(keys.weather_api_key.clone());
        let mut engine = self.engine.lock().await;
        let saved = engine.set_keys(keys).await;
        self.publish(&engine);
        saved
    }

    /// Connection test against the feed. The engine lock is released before
    /// the request goes out, so a slow feed never delays ticks.
    pub async fn probe_feed(&self, api_key: Option<Secret>) -> Result<FeedSample, SimError> {
        let request = self.engine.lock().await.probe_request(api_key);
        request.probe().await
    }

    fn publish(&self, engine: &SimulationEngine) {
        self.status.send_replace(StatusSnapshot::of(engine));
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}
