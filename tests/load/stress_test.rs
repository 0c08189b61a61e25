//! Readers against a ticking engine.
//!
//! Snapshot readers must never wait on the engine lock, and the history must
//! stay bounded and ordered however many ticks run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use gridtwin::controller::SimulationController;
use gridtwin::domain::{AmbientConditions, SimulationMode};
use gridtwin::forecast::{AmbientProvider, EstimationService};
use gridtwin::query::{Filter, QueryEngine};
use gridtwin::simulation::{EnginePorts, EngineSettings, SimulationEngine};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

struct Calm;

#[async_trait]
impl AmbientProvider for Calm {
    async fn fetch_ambient(&self, _lat: f64, _lon: f64) -> Result<AmbientConditions> {
        Ok(AmbientConditions {
            irradiance_wm2: 0.0,
            temperature_c: 25.0,
            wind_speed_ms: 0.0,
        })
    }
}

async fn build_controller(max_in_memory: usize) -> Arc<SimulationController> {
    let engine = SimulationEngine::start(
        EngineSettings {
            mode: SimulationMode::Manual,
            max_in_memory,
            max_persisted: max_in_memory.min(100),
            random_seed: Some(99),
            ..EngineSettings::default()
        },
        EnginePorts::default(),
    )
    .await
    .expect("engine starts");
    Arc::new(SimulationController::new(
        engine,
        Arc::new(EstimationService::new(Arc::new(Calm))),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_readers_while_ticking() {
    let controller = build_controller(1000).await;
    let cancel = CancellationToken::new();

    let ticker = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(Duration::from_millis(1), cancel).await })
    };

    let query = QueryEngine::default();
    let mut readers = JoinSet::new();
    for _ in 0..50 {
        let controller = controller.clone();
        readers.spawn(async move {
            let mut worst = Duration::ZERO;
            for _ in 0..200 {
                let started = Instant::now();
                let status = controller.snapshot();
                let filtered = query.filter(&status.history, &Filter::window(24), Utc::now());
                let _ = query.paginate(&filtered.readings, 1, 20);
                worst = worst.max(started.elapsed());
                assert!(status.history.len() <= 1000);
                assert!(status
                    .history
                    .windows(2)
                    .all(|w| w[0].timestamp < w[1].timestamp));
                tokio::task::yield_now().await;
            }
            worst
        });
    }

    let mut worst = Duration::ZERO;
    while let Some(res) = readers.join_next().await {
        worst = worst.max(res.expect("reader task"));
    }
    cancel.cancel();
    ticker.await.expect("ticker task");

    println!("worst snapshot read: {worst:?}");
    assert!(worst < Duration::from_millis(250));
    assert!(controller.snapshot().history.len() > 0);
}

#[tokio::test]
#[ignore]
async fn history_stays_bounded_over_many_ticks() {
    let controller = build_controller(1000).await;
    for _ in 0..5000 {
        controller.tick_now().await;
    }
    let history = controller.snapshot().history;
    assert_eq!(history.len(), 1000);
    assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}
