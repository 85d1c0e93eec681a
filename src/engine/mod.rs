mod allocator;
mod dispatcher;
mod error;
#[cfg(test)]
mod tests;

pub use error::EngineError;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::grid::SeatGrid;
use crate::limits::MAX_REQUESTER_LEN;
use crate::locks::LockTable;
use crate::model::*;
use crate::notify::{Notification, NotifyHub};
use crate::queue::RequestQueue;
use crate::stats::StatsLog;

use dispatcher::DispatchPass;

/// Requester name under which cancellations are logged.
pub const CANCEL_REQUESTER: &str = "Cancel";

/// Process-wide strategy toggle, read once per dequeued request.
struct StrategyCell(AtomicU8);

impl StrategyCell {
    fn new(strategy: Strategy) -> Self {
        Self(AtomicU8::new(strategy.as_u8()))
    }

    fn load(&self) -> Strategy {
        Strategy::from_u8(self.0.load(Ordering::Acquire))
    }

    fn swap(&self, strategy: Strategy) -> Strategy {
        Strategy::from_u8(self.0.swap(strategy.as_u8(), Ordering::AcqRel))
    }
}

pub struct Engine {
    config: EngineConfig,
    pub grid: SeatGrid,
    pub locks: LockTable,
    pub(crate) queue: RequestQueue,
    pub stats: StatsLog,
    pub notify: Arc<NotifyHub>,
    strategy: StrategyCell,
    /// The running (or last) processing pass.
    pass: Mutex<Option<DispatchPass>>,
}

impl Engine {
    pub fn new(config: EngineConfig, notify: Arc<NotifyHub>) -> Result<Self, EngineError> {
        config.validate()?;
        let grid = SeatGrid::new(config.rows, config.cols);
        let locks = LockTable::new(grid.len());
        Ok(Self {
            strategy: StrategyCell::new(config.strategy),
            grid,
            locks,
            queue: RequestQueue::new(),
            stats: StatsLog::new(),
            notify,
            pass: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy.load()
    }

    /// Takes effect for the next dequeued request; in-flight attempts keep
    /// the strategy they started with. Returns the previous strategy.
    pub fn set_strategy(&self, strategy: Strategy) -> Strategy {
        let previous = self.strategy.swap(strategy);
        if previous != strategy {
            info!("strategy switched: {previous} -> {strategy}");
        }
        previous
    }

    // ── Producers ────────────────────────────────────────────

    /// Enqueue a request. Out-of-range seats are rejected here so the
    /// allocator never sees them.
    pub fn submit(&self, requester: &str, seat: SeatId) -> Result<Ulid, EngineError> {
        if requester.is_empty() {
            return Err(EngineError::LimitExceeded("requester name empty"));
        }
        if requester.len() > MAX_REQUESTER_LEN {
            return Err(EngineError::LimitExceeded("requester name too long"));
        }
        self.grid.check(seat)?;

        let request = BookingRequest::new(requester, seat);
        let id = request.id;
        let depth = self.queue.push(request);
        metrics::counter!(crate::observability::REQUESTS_SUBMITTED_TOTAL).increment(1);
        metrics::gauge!(crate::observability::QUEUE_DEPTH).set(depth as f64);
        debug!("queued {requester} for {seat} (depth {depth})");
        self.publish_state();
        Ok(id)
    }

    /// Enqueue by grid coordinates.
    pub fn submit_at(&self, requester: &str, row: u32, col: u32) -> Result<Ulid, EngineError> {
        if row >= self.grid.rows() || col >= self.grid.cols() {
            return Err(EngineError::InvalidResource {
                seat: SeatId(row.saturating_mul(self.grid.cols()).saturating_add(col)),
                seats: self.grid.len(),
            });
        }
        self.submit(requester, SeatId::from_row_col(row, col, self.grid.cols()))
    }

    /// Parse a user-entered, 1-based seat number.
    pub fn seat_from_label(&self, raw: &str) -> Result<SeatId, EngineError> {
        let label: u32 = raw
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidSeatLabel(raw.to_string()))?;
        let seat = SeatId::from_label(label)
            .ok_or_else(|| EngineError::InvalidSeatLabel(raw.to_string()))?;
        self.grid.check(seat)?;
        Ok(seat)
    }

    // ── Processing ───────────────────────────────────────────

    /// Run one request to its outcome under the current strategy, then
    /// count, log, and notify.
    pub async fn process(&self, request: &BookingRequest) -> Result<Outcome, EngineError> {
        self.process_with(request, self.strategy(), &CancellationToken::new())
            .await
    }

    pub async fn process_with(
        &self,
        request: &BookingRequest,
        strategy: Strategy,
        stop: &CancellationToken,
    ) -> Result<Outcome, EngineError> {
        let started = std::time::Instant::now();
        let outcome = self.allocate(request, strategy, stop).await?;
        let label = crate::observability::strategy_label(strategy);
        metrics::histogram!(crate::observability::ALLOCATION_DURATION_SECONDS, "strategy" => label)
            .record(started.elapsed().as_secs_f64());
        let reason = match &outcome {
            Outcome::Conflict { reason, .. } => reason.as_str(),
            _ => "",
        };
        metrics::counter!(
            crate::observability::OUTCOMES_TOTAL,
            "outcome" => outcome.label(),
            "strategy" => label,
            "reason" => reason
        )
        .increment(1);
        debug!("{} {} via {strategy}: {}", request.requester, request.seat, outcome.label());

        self.record(&request.requester, outcome.clone());
        Ok(outcome)
    }

    // ── Cancellation ─────────────────────────────────────────

    /// Free a booked seat. A free seat is left untouched (version included)
    /// and reported as `NotBooked`.
    pub fn cancel(&self, seat: SeatId) -> Result<CancelOutcome, EngineError> {
        if self.grid.release(seat)? {
            metrics::counter!(crate::observability::CANCELLATIONS_TOTAL, "result" => "released")
                .increment(1);
            self.record(CANCEL_REQUESTER, Outcome::Released { seat });
            Ok(CancelOutcome::Released)
        } else {
            metrics::counter!(crate::observability::CANCELLATIONS_TOTAL, "result" => "not_booked")
                .increment(1);
            let notice = Notice::NotBooked { seat };
            info!("{notice}");
            self.notify.send(Notification::Notice { notice });
            Ok(CancelOutcome::NotBooked)
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn seat(&self, seat: SeatId) -> Result<SeatState, EngineError> {
        self.grid.read(seat)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        self.grid.snapshot()
    }

    pub fn pending(&self) -> Vec<BookingRequest> {
        self.queue.snapshot()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn log(&self) -> Vec<LogEntry> {
        self.stats.entries()
    }

    // ── Bookkeeping ──────────────────────────────────────────

    /// Count + log + notify in one call.
    fn record(&self, requester: &str, outcome: Outcome) -> LogEntry {
        let entry = self.stats.record(requester, outcome);
        if self.notify.has_listeners() {
            self.notify.send(Notification::LogAppended { entry: entry.clone() });
            self.publish_state();
        }
        entry
    }

    /// Push grid + pending queue to observers, if any are listening.
    fn publish_state(&self) {
        if !self.notify.has_listeners() {
            return;
        }
        let seq = self.notify.next_state_seq();
        self.notify.send(Notification::StateChanged {
            seq,
            grid: Arc::new(self.grid.snapshot()),
            pending: Arc::new(self.queue.snapshot()),
        });
    }
}
