//! Bounded, time-ordered telemetry history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::PersistencePort;
use crate::domain::{ProviderKeys, Reading, SimError, SimulationMode};

/// Storage key of the persisted engine state.
pub const STATE_KEY: &str = "smart_meter_data";

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("reading at {got} precedes latest entry at {latest}")]
    OutOfOrder {
        got: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Engine settings stored next to the history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub mode: SimulationMode,
    #[serde(flatten)]
    pub keys: ProviderKeys,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    history: Vec<Reading>,
    #[serde(default)]
    settings: Option<StoredSettings>,
}

/// Immutable point-in-time copy of the history, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot(Arc<[Reading]>);

impl HistorySnapshot {
    pub fn latest(&self) -> Option<&Reading> {
        self.0.last()
    }
}

impl Deref for HistorySnapshot {
    type Target = [Reading];

    fn deref(&self) -> &[Reading] {
        &self.0
    }
}

impl From<Vec<Reading>> for HistorySnapshot {
    fn from(readings: Vec<Reading>) -> Self {
        Self(readings.into())
    }
}

/// Result of [`HistoryStore::restore`].
#[derive(Debug)]
pub struct Restored {
    pub store: HistoryStore,
    pub settings: Option<StoredSettings>,
    /// Set when stored state existed but could not be used.
    pub warning: Option<SimError>,
}

/// FIFO ring of readings, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    readings: VecDeque<Reading>,
    max_in_memory: usize,
    max_persisted: usize,
}

impl HistoryStore {
    pub fn new(max_in_memory: usize, max_persisted: usize) -> Self {
        let max_in_memory = max_in_memory.max(1);
        Self {
            readings: VecDeque::with_capacity(max_in_memory.min(4096)),
            max_in_memory,
            max_persisted,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn max_in_memory(&self) -> usize {
        self.max_in_memory
    }

    pub fn max_persisted(&self) -> usize {
        self.max_persisted
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Earliest timestamp that keeps the series strictly increasing.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.latest() {
            Some(last) if now <= last.timestamp => last.timestamp + Duration::milliseconds(1),
            _ => now,
        }
    }

    /// Appends a reading, evicting the oldest entries beyond capacity.
    ///
    /// Returns how many readings were evicted.
    pub fn append(&mut self, reading: Reading) -> Result<usize, HistoryError> {
        if let Some(last) = self.latest() {
            if reading.timestamp < last.timestamp {
                return Err(HistoryError::OutOfOrder {
                    got: reading.timestamp,
                    latest: last.timestamp,
                });
            }
        }
        self.readings.push_back(reading);

        let mut evicted = 0;
        while self.readings.len() > self.max_in_memory {
            self.readings.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, len = self.readings.len(), "history evicted oldest readings");
        }
        Ok(evicted)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot(self.readings.iter().cloned().collect())
    }

    fn persisted_tail(&self) -> Vec<Reading> {
        let skip = self.readings.len().saturating_sub(self.max_persisted);
        self.readings.iter().skip(skip).cloned().collect()
    }

    /// Serializes the most recent `max_persisted` readings plus settings.
    pub fn to_blob(&self, settings: &StoredSettings) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&PersistedState {
            history: self.persisted_tail(),
            settings: Some(settings.clone()),
        })
    }

    /// Rebuilds a store from a blob written by [`HistoryStore::to_blob`].
    pub fn from_blob(
        blob: &[u8],
        max_in_memory: usize,
        max_persisted: usize,
    ) -> Result<(Self, Option<StoredSettings>), SimError> {
        let state: PersistedState = serde_json::from_slice(blob)
            .map_err(|e| SimError::PersistenceCorrupt(e.to_string()))?;

        let mut store = Self::new(max_in_memory, max_persisted);
        for reading in state.history {
            store
                .append(reading)
                .map_err(|e| SimError::PersistenceCorrupt(e.to_string()))?;
        }
        Ok((store, state.settings))
    }

    pub async fn persist(
        &self,
        port: &dyn PersistencePort,
        settings: &StoredSettings,
    ) -> Result<(), SimError> {
        let blob = self
            .to_blob(settings)
            .map_err(|e| SimError::PersistenceUnavailable(e.to_string()))?;
        port.save(STATE_KEY, &blob)
            .await
            .map_err(|e| SimError::PersistenceUnavailable(e.to_string()))
    }

    /// Loads the last persisted state, or an empty store if there is none or it
    /// is unusable.
    pub async fn restore(
        port: &dyn PersistencePort,
        max_in_memory: usize,
        max_persisted: usize,
    ) -> Restored {
        let empty = || Self::new(max_in_memory, max_persisted);

        let blob = match port.load(STATE_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                return Restored {
                    store: empty(),
                    settings: None,
                    warning: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "loading persisted state failed, starting empty");
                return Restored {
                    store: empty(),
                    settings: None,
                    warning: Some(SimError::PersistenceUnavailable(e.to_string())),
                };
            }
        };

        match Self::from_blob(&blob, max_in_memory, max_persisted) {
            Ok((store, settings)) => Restored {
                store,
                settings,
                warning: None,
            },
            Err(e) => {
                warn!(error = %e, "persisted state unusable, starting empty");
                Restored {
                    store: empty(),
                    settings: None,
                    warning: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Secret;
    use crate::repo::{MemoryPersistence, MockPersistencePort, PersistenceError};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn reading_at(secs: i64) -> Reading {
        Reading {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            solar_kw: 4.2,
            wind_kw: 1.8,
            consumption_kw: 6.5,
            grid_import_kw: 0.0,
            battery_level_pct: 78.0,
            efficiency_pct: 91.3,
        }
    }

    #[test]
    fn test_append_evicts_oldest_first() {
        let mut store = HistoryStore::new(3, 2);
        for i in 0..5 {
            store.append(reading_at(i)).unwrap();
        }
        let snap = store.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0], reading_at(2));
        assert_eq!(snap.latest(), Some(&reading_at(4)));
    }

    #[test]
    fn test_append_rejects_older_reading() {
        let mut store = HistoryStore::new(10, 10);
        store.append(reading_at(10)).unwrap();
        assert!(matches!(
            store.append(reading_at(5)),
            Err(HistoryError::OutOfOrder { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_next_timestamp_is_strictly_increasing() {
        let mut store = HistoryStore::new(10, 10);
        let t = reading_at(0).timestamp;
        assert_eq!(store.next_timestamp(t), t);
        store.append(reading_at(0)).unwrap();
        assert_eq!(store.next_timestamp(t), t + Duration::milliseconds(1));
        assert_eq!(
            store.next_timestamp(t - Duration::seconds(30)),
            t + Duration::milliseconds(1)
        );
        let later = t + Duration::seconds(5);
        assert_eq!(store.next_timestamp(later), later);
    }

    #[test]
    fn test_snapshot_is_detached_from_store() {
        let mut store = HistoryStore::new(10, 10);
        store.append(reading_at(0)).unwrap();
        let snap = store.snapshot();
        store.append(reading_at(1)).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_persist_restore_round_trip() {
        let port = MemoryPersistence::new();
        let mut store = HistoryStore::new(1000, 100);
        for i in 0..40 {
            store.append(reading_at(i * 5)).unwrap();
        }
        let settings = StoredSettings {
            mode: SimulationMode::External,
            keys: ProviderKeys {
                feed_api_key: Secret::new("emon-key"),
                weather_api_key: None,
            },
        };
        store.persist(&port, &settings).await.unwrap();

        let restored = HistoryStore::restore(&port, 1000, 100).await;
        assert!(restored.warning.is_none());
        assert_eq!(restored.settings, Some(settings));
        assert_eq!(&*restored.store.snapshot(), &*store.snapshot());
    }

    #[tokio::test]
    async fn test_persist_keeps_only_most_recent() {
        let port = MemoryPersistence::new();
        let mut store = HistoryStore::new(1000, 100);
        for i in 0..250 {
            store.append(reading_at(i)).unwrap();
        }
        store.persist(&port, &StoredSettings::default()).await.unwrap();

        let restored = HistoryStore::restore(&port, 1000, 100).await;
        let snap = restored.store.snapshot();
        assert_eq!(snap.len(), 100);
        assert_eq!(snap[0], reading_at(150));
        assert_eq!(snap.latest(), Some(&reading_at(249)));
    }

    #[tokio::test]
    async fn test_restore_without_state_is_empty() {
        let restored = HistoryStore::restore(&MemoryPersistence::new(), 1000, 100).await;
        assert!(restored.store.is_empty());
        assert!(restored.settings.is_none());
        assert!(restored.warning.is_none());
    }

    #[tokio::test]
    async fn test_restore_corrupt_state_is_empty() {
        let port = MemoryPersistence::new();
        port.insert(STATE_KEY, "{ definitely not json");
        let restored = HistoryStore::restore(&port, 1000, 100).await;
        assert!(restored.store.is_empty());
        assert!(matches!(restored.warning, Some(SimError::PersistenceCorrupt(_))));
    }

    #[tokio::test]
    async fn test_restore_unordered_state_is_corrupt() {
        let port = MemoryPersistence::new();
        let blob = serde_json::json!({ "history": [reading_at(10), reading_at(1)] });
        port.insert(STATE_KEY, serde_json::to_vec(&blob).unwrap());
        let restored = HistoryStore::restore(&port, 1000, 100).await;
        assert!(restored.store.is_empty());
        assert!(matches!(restored.warning, Some(SimError::PersistenceCorrupt(_))));
    }

    #[tokio::test]
    async fn test_restore_legacy_blob_without_settings() {
        let port = MemoryPersistence::new();
        let blob = serde_json::json!({ "history": [reading_at(1), reading_at(2)] });
        port.insert(STATE_KEY, serde_json::to_vec(&blob).unwrap());
        let restored = HistoryStore::restore(&port, 1000, 100).await;
        assert_eq!(restored.store.len(), 2);
        assert!(restored.settings.is_none());
    }

    #[tokio::test]
    async fn test_save_failure_surfaces_as_persistence_unavailable() {
        let mut port = MockPersistencePort::new();
        port.expect_save().returning(|_, _| {
            Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        });
        let mut store = HistoryStore::new(10, 10);
        store.append(reading_at(0)).unwrap();
        let err = store.persist(&port, &StoredSettings::default()).await.unwrap_err();
        assert!(matches!(err, SimError::PersistenceUnavailable(msg) if msg.contains("read-only")));
    }

    #[tokio::test]
    async fn test_load_failure_restores_empty() {
        let mut port = MockPersistencePort::new();
        port.expect_load().returning(|_| {
            Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk gone",
            )))
        });
        let restored = HistoryStore::restore(&port, 1000, 100).await;
        assert!(restored.store.is_empty());
        assert!(matches!(restored.warning, Some(SimError::PersistenceUnavailable(_))));
    }

    proptest! {
        #[test]
        fn prop_bounded_and_ordered(cap in 1usize..50, gaps in proptest::collection::vec(0i64..10, 0..300)) {
            let mut store = HistoryStore::new(cap, cap);
            let mut t = 0;
            for gap in gaps {
                t += gap;
                store.append(reading_at(t)).unwrap();
                prop_assert!(store.len() <= cap);
            }
            let snap = store.snapshot();
            prop_assert!(snap.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }
}
