//! Engine lifecycle against on-disk persistence.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use gridtwin::domain::{ProviderKeys, Secret, SimError, SimulationMode};
use gridtwin::repo::{FilePersistence, PersistencePort, STATE_KEY};
use gridtwin::simulation::{EnginePorts, EngineSettings, ManualClock, SimulationEngine};

fn settings() -> EngineSettings {
    EngineSettings {
        random_seed: Some(2024),
        ..EngineSettings::default()
    }
}

fn ports(dir: &std::path::Path, clock: Arc<ManualClock>) -> EnginePorts {
    EnginePorts::new(Arc::new(FilePersistence::new(dir))).with_clock(clock)
}

#[tokio::test]
async fn restart_restores_history_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));

    let mut engine = SimulationEngine::start(settings(), ports(dir.path(), clock.clone()))
        .await
        .unwrap();
    for _ in 0..150 {
        let report = engine.tick().await;
        assert!(report.warnings.is_empty());
        clock.advance(Duration::minutes(5));
    }
    engine.set_mode(SimulationMode::Manual).await.unwrap();
    engine
        .set_keys(ProviderKeys {
            feed_api_key: Secret::new("emon-live"),
            weather_api_key: None,
        })
        .await
        .unwrap();

    let on_disk = std::fs::read_to_string(dir.path().join(format!("{STATE_KEY}.json"))).unwrap();
    assert!(on_disk.contains("\"mode\":\"manual\""));

    let restarted = SimulationEngine::start(settings(), ports(dir.path(), clock.clone()))
        .await
        .unwrap();
    let before = engine.snapshot();
    let after = restarted.snapshot();
    assert_eq!(after.len(), 100);
    assert_eq!(&after[..], &before[50..]);
    assert_eq!(restarted.mode(), SimulationMode::Manual);
    assert_eq!(restarted.keys().feed_api_key.expose(), "emon-live");
}

#[tokio::test]
async fn corrupt_file_starts_empty_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilePersistence::new(dir.path());
    store.save(STATE_KEY, b"{\"history\": [ {\"truncated\"").await.unwrap();

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
    let mut engine = SimulationEngine::start(settings(), ports(dir.path(), clock))
        .await
        .unwrap();
    assert!(engine.history().is_empty());
    assert!(matches!(engine.restore_warning(), Some(SimError::PersistenceCorrupt(_))));

    engine.tick().await;
    let blob = store.load(STATE_KEY).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&blob).unwrap();
    assert_eq!(value["history"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn secrets_never_appear_in_debug_output() {
    let keys = ProviderKeys {
        feed_api_key: Secret::new("super-secret-feed"),
        weather_api_key: Some(Secret::new("super-secret-weather")),
    };
    let printed = format!("{keys:?}");
    assert!(!printed.contains("super-secret"));
}
