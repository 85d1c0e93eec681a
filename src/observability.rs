use std::net::SocketAddr;

use crate::model::Strategy;

// ── Request flow ────────────────────────────────────────────────

/// Counter: requests accepted by `submit`.
pub const REQUESTS_SUBMITTED_TOTAL: &str = "seatlock_requests_submitted_total";

/// Counter: processed requests. Labels: outcome, strategy, reason.
pub const OUTCOMES_TOTAL: &str = "seatlock_outcomes_total";

/// Counter: optimistic commits that lost the compare-and-swap and looped.
pub const OPTIMISTIC_RETRIES_TOTAL: &str = "seatlock_optimistic_retries_total";

/// Histogram: time from dequeue to outcome in seconds. Labels: strategy.
pub const ALLOCATION_DURATION_SECONDS: &str = "seatlock_allocation_duration_seconds";

/// Counter: explicit cancellations. Labels: result.
pub const CANCELLATIONS_TOTAL: &str = "seatlock_cancellations_total";

// ── Utilization ─────────────────────────────────────────────────

/// Gauge: pending requests in the queue.
pub const QUEUE_DEPTH: &str = "seatlock_queue_depth";

/// Gauge: workers currently draining the queue.
pub const WORKERS_ACTIVE: &str = "seatlock_workers_active";

/// Counter: observer notifications skipped because the observer lagged.
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "seatlock_notifications_dropped_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Strategy to a short label for metrics.
pub fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Optimistic => "optimistic",
        Strategy::Pessimistic => "pessimistic",
    }
}
