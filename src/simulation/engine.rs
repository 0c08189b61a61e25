use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Clock, FeedProvider, FeedSample, RawSample, SyntheticGenerator, SystemClock};
use crate::domain::{
    round_to, BatteryModel, BatteryOutcome, BatteryParams, BatteryState, ProviderKeys, Reading,
    Secret, SimError, SimulationMode,
};
use crate::repo::{HistorySnapshot, HistoryStore, MemoryPersistence, PersistencePort, StoredSettings};

const SAMPLE_HISTORY_LEN: usize = 100;
const SAMPLE_HISTORY_SPACING_MINUTES: i64 = 30;

/// Construction parameters for [`SimulationEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mode: SimulationMode,
    pub keys: ProviderKeys,
    pub battery: BatteryParams,
    pub initial_level_pct: f64,
    pub max_in_memory: usize,
    pub max_persisted: usize,
    pub feed_timeout: Duration,
    pub timezone: Tz,
    pub random_seed: Option<u64>,
    pub seed_sample_data: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Auto,
            keys: ProviderKeys {
                feed_api_key: Secret::new("demo"),
                weather_api_key: None,
            },
            battery: BatteryParams::default(),
            initial_level_pct: 78.0,
            max_in_memory: 1000,
            max_persisted: 100,
            feed_timeout: Duration::from_secs(3),
            timezone: chrono_tz::UTC,
            random_seed: None,
            seed_sample_data: false,
        }
    }
}

impl EngineSettings {
    fn validate(&self) -> Result<(), SimError> {
        self.battery.validate()?;
        if self.max_in_memory == 0 {
            return Err(SimError::ConfigurationInvalid(
                "history must hold at least one reading".to_string(),
            ));
        }
        if self.feed_timeout.is_zero() {
            return Err(SimError::ConfigurationInvalid(
                "feed timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Collaborators the engine talks to.
#[derive(Clone)]
pub struct EnginePorts {
    pub persistence: Arc<dyn PersistencePort>,
    pub feed: Option<Arc<dyn FeedProvider>>,
    pub clock: Arc<dyn Clock>,
}

impl EnginePorts {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self {
            persistence,
            feed: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedProvider>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for EnginePorts {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }
}

/// Where a tick's generation and load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Synthetic,
    Manual,
    Feed,
    /// Feed failed; manual values were used instead.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub reading: Reading,
    pub source: ReadingSource,
    pub outcome: BatteryOutcome,
    /// Non-fatal problems hit during the tick.
    pub warnings: Vec<SimError>,
}

/// Single simulated asset: generator, battery and history on one timeline.
pub struct SimulationEngine {
    mode: SimulationMode,
    keys: ProviderKeys,
    battery: BatteryModel,
    history: HistoryStore,
    generator: SyntheticGenerator,
    feed: Option<Arc<dyn FeedProvider>>,
    persistence: Arc<dyn PersistencePort>,
    clock: Arc<dyn Clock>,
    feed_timeout: Duration,
    restore_warning: Option<SimError>,
}

/// A feed fetch bounded by the configured timeout.
pub struct FeedRequest {
    feed: Option<Arc<dyn FeedProvider>>,
    api_key: Secret,
    timeout: Duration,
}

impl FeedRequest {
    pub async fn send(self) -> Result<FeedSample, SimError> {
        let feed = self
            .feed
            .ok_or_else(|| SimError::ProviderUnavailable("no metering feed configured".to_string()))?;

        match tokio::time::timeout(self.timeout, feed.fetch_reading(&self.api_key)).await {
            Ok(Ok(sample)) => Ok(sample),
            Ok(Err(e)) => Err(SimError::ProviderUnavailable(e.to_string())),
            Err(_) => Err(SimError::ProviderUnavailable(format!(
                "feed did not answer within {} ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// [`FeedRequest::send`] with the outcome logged.
    pub async fn probe(self) -> Result<FeedSample, SimError> {
        let result = self.send().await;
        match &result {
            Ok(sample) => info!(solar_kw = sample.solar_kw, "feed probe succeeded"),
            Err(e) => warn!(error = %e, "feed probe failed"),
        }
        result
    }
}

impl SimulationEngine {
    /// Validates settings and restores persisted history.
    ///
    /// Persisted mode and keys replace the ones in `settings`. The battery is
    /// not persisted and starts at `initial_level_pct`.
    pub async fn start(settings: EngineSettings, ports: EnginePorts) -> Result<Self, SimError> {
        settings.validate()?;
        let battery = BatteryModel::new(settings.battery, settings.initial_level_pct)?;

        let restored = HistoryStore::restore(
            ports.persistence.as_ref(),
            settings.max_in_memory,
            settings.max_persisted,
        )
        .await;

        let (mode, keys) = match restored.settings {
            Some(stored) => {
                debug!(mode = %stored.mode, "using persisted engine settings");
                (stored.mode, stored.keys)
            }
            None => (settings.mode, settings.keys),
        };

        let mut engine = Self {
            mode,
            keys,
            battery,
            history: restored.store,
            generator: SyntheticGenerator::new(settings.timezone, settings.random_seed),
            feed: ports.feed,
            persistence: ports.persistence,
            clock: ports.clock,
            feed_timeout: settings.feed_timeout,
            restore_warning: restored.warning,
        };

        if settings.seed_sample_data && engine.history.is_empty() {
            engine.seed_sample_history().await;
        }

        info!(
            mode = %engine.mode,
            readings = engine.history.len(),
            battery_level_pct = engine.battery.level_pct(),
            "simulation engine started"
        );
        Ok(engine)
    }

    async fn seed_sample_history(&mut self) {
        let readings = self.generator.sample_history(
            self.clock.now(),
            SAMPLE_HISTORY_LEN,
            ChronoDuration::minutes(SAMPLE_HISTORY_SPACING_MINUTES),
        );
        for reading in readings {
            if let Err(e) = self.history.append(reading) {
                error!(error = %e, "sample reading rejected");
            }
        }
        info!(readings = self.history.len(), "seeded sample history");
        if let Err(e) = self.persist().await {
            warn!(error = %e, "failed to persist sample history");
        }
    }

    /// Produces exactly one reading, appends it and persists the history.
    pub async fn tick(&mut self) -> TickReport {
        let mut warnings = Vec::new();
        let now = self.clock.now();

        let (raw, source) = match self.mode {
            SimulationMode::Auto => (self.generator.auto_sample(now), ReadingSource::Synthetic),
            SimulationMode::Manual => (self.generator.manual_sample(), ReadingSource::Manual),
            SimulationMode::External => match self.fetch_feed().await {
                Ok(sample) => (self.raw_from_feed(sample), ReadingSource::Feed),
                Err(e) => {
                    warn!(error = %e, "feed unavailable, using manual values for this tick");
                    warnings.push(e);
                    (self.generator.manual_sample(), ReadingSource::Fallback)
                }
            },
        };

        let solar_kw = round_to(raw.solar_kw, 2);
        let wind_kw = round_to(raw.wind_kw, 2);
        let consumption_kw = round_to(raw.consumption_kw, 2);
        let net_kw = solar_kw + wind_kw - consumption_kw;

        let outcome = self.battery.update(net_kw);
        // a deficit the battery could not cover after this update comes from the grid
        let grid_import_kw = if net_kw < 0.0 && self.battery.at_reserve_floor() {
            round_to(net_kw.abs(), 2)
        } else {
            0.0
        };

        let reading = Reading {
            timestamp: self.history.next_timestamp(now),
            solar_kw,
            wind_kw,
            consumption_kw,
            grid_import_kw,
            battery_level_pct: round_to(self.battery.level_pct(), 1),
            efficiency_pct: round_to(raw.efficiency_pct, 1),
        };
        if let Err(e) = self.history.append(reading.clone()) {
            error!(error = %e, "reading rejected by history");
        }

        if let Err(e) = self.persist().await {
            warn!(error = %e, "history not persisted, continuing in memory");
            warnings.push(e);
        }

        info!(
            source = ?source,
            solar_kw,
            wind_kw,
            consumption_kw,
            grid_import_kw,
            battery_level_pct = reading.battery_level_pct,
            "tick"
        );

        TickReport {
            reading,
            source,
            outcome,
            warnings,
        }
    }

    fn raw_from_feed(&mut self, sample: FeedSample) -> RawSample {
        let efficiency_pct = match sample.efficiency_pct {
            Some(eff) => eff,
            None => self.generator.feed_efficiency(),
        };
        RawSample {
            solar_kw: sample.solar_kw.max(0.0),
            wind_kw: sample.wind_kw.max(0.0),
            consumption_kw: sample.consumption_kw.max(0.0),
            efficiency_pct,
        }
    }

    fn feed_request(&self, api_key: Secret) -> FeedRequest {
        FeedRequest {
            feed: self.feed.clone(),
            api_key,
            timeout: self.feed_timeout,
        }
    }

    async fn fetch_feed(&self) -> Result<FeedSample, SimError> {
        self.feed_request(self.keys.feed_api_key.clone()).send().await
    }

    /// A detached feed request for a connection test; nothing is recorded.
    ///
    /// Uses `api_key` when given, otherwise the current feed key. The request
    /// holds no borrow of the engine, so callers can release their lock
    /// before awaiting it.
    pub fn probe_request(&self, api_key: Option<Secret>) -> FeedRequest {
        let key = api_key.unwrap_or_else(|| self.keys.feed_api_key.clone());
        self.feed_request(key)
    }

    /// One-off feed request, without recording a reading.
    pub async fn probe_feed(&self, api_key: Option<&Secret>) -> Result<FeedSample, SimError> {
        self.probe_request(api_key.cloned()).probe().await
    }

    fn stored_settings(&self) -> StoredSettings {
        StoredSettings {
            mode: self.mode,
            keys: self.keys.clone(),
        }
    }

    async fn persist(&self) -> Result<(), SimError> {
        self.history
            .persist(self.persistence.as_ref(), &self.stored_settings())
            .await
    }

    /// Switches mode for subsequent ticks and persists it.
    ///
    /// The change always applies; a returned error only means it was not
    /// saved.
    pub async fn set_mode(&mut self, mode: SimulationMode) -> Result<(), SimError> {
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "simulation mode changed");
        }
        self.mode = mode;
        self.persist().await
    }

    /// Replaces the provider keys and persists them. Same contract as
    /// [`SimulationEngine::set_mode`].
    pub async fn set_keys(&mut self, keys: ProviderKeys) -> Result<(), SimError> {
        self.keys = keys;
        info!("provider keys updated");
        self.persist().await
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn keys(&self) -> &ProviderKeys {
        &self.keys
    }

    pub fn battery_state(&self) -> BatteryState {
        self.battery.state()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.history.snapshot()
    }

    /// Why persisted state was discarded on start, if it was.
    pub fn restore_warning(&self) -> Option<&SimError> {
        self.restore_warning.as_ref()
    }
}
