use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tracing::info;

use seatlock::sim;
use seatlock::{
    CancelOutcome, Engine, EngineConfig, JsonLinesObserver, NotifyHub, Observer, Strategy,
    TracingObserver,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("SEATLOCK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    seatlock::observability::init(metrics_port)?;

    let mut config = EngineConfig::from_env();
    if std::env::var("SEATLOCK_PACING_MS").is_err() {
        config.pacing = Duration::from_millis(500);
    }
    let rounds: usize = std::env::var("SEATLOCK_ROUNDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let batch: usize = std::env::var("SEATLOCK_BATCH")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(sim::DEFAULT_BATCH);
    let seed: Option<u64> = std::env::var("SEATLOCK_SEED")
        .ok()
        .and_then(|s| s.parse().ok());
    let json = std::env::var("SEATLOCK_OBSERVER").is_ok_and(|v| v == "json");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.clone(), notify.clone())?);

    let observer: Arc<dyn Observer> = if json {
        Arc::new(JsonLinesObserver::new(std::io::stdout()))
    } else {
        Arc::new(TracingObserver)
    };
    let observer_task = seatlock::spawn_observer(&notify, observer);

    info!("seatlock demo");
    info!("  grid: {}x{}", config.rows, config.cols);
    info!("  workers: {}", config.workers);
    info!("  latency: {:?}, pacing: {:?}", config.latency, config.pacing);
    info!("  max_attempts: {}", config.max_attempts);
    info!("  strategy: {}", config.strategy);
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    for round in 0..rounds {
        // Alternate strategies so both disciplines get exercised.
        let strategy = if round % 2 == 0 {
            config.strategy
        } else {
            match config.strategy {
                Strategy::Optimistic => Strategy::Pessimistic,
                Strategy::Pessimistic => Strategy::Optimistic,
            }
        };
        engine.set_strategy(strategy);

        // Two producers racing on the same grid.
        let producers: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let mut producer_rng = StdRng::seed_from_u64(rng.r#gen());
                tokio::task::spawn_blocking(move || {
                    sim::simulate_requests(&engine, batch, &mut producer_rng)
                })
            })
            .collect();
        for result in futures::future::join_all(producers).await {
            if let Err(e) = result? {
                tracing::warn!("producer failed: {e}");
            }
        }

        engine.start_processing();
        tokio::select! {
            _ = engine.drain() => {}
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping workers");
                engine.stop_processing().await;
                break;
            }
        }

        if let Some(seat) = sim::random_booked_seat(&engine, &mut rng)
            && engine.cancel(seat)? == CancelOutcome::Released
        {
            info!("round {round}: cancelled {seat}");
        }

        let stats = engine.stats();
        info!(
            "round {round} ({strategy}): booked={} conflicts={} released={} occupied={}",
            stats.booked,
            stats.conflicts,
            stats.released,
            engine.snapshot().occupied_count()
        );
    }

    engine.stop_processing().await;
    // Let the observer flush what is already queued before exiting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    observer_task.abort();

    let stats = engine.stats();
    info!(
        "done: processed={} booked={} conflicts={} released={} pending={}",
        stats.processed(),
        stats.booked,
        stats.conflicts,
        stats.released,
        engine.pending_len()
    );
    Ok(())
}
