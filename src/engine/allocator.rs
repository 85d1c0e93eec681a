use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::*;

use super::{Engine, EngineError};

/// Sleep for the simulated processing time. Returns true if `stop` fired
/// before the full latency elapsed.
async fn simulate_latency(latency: Duration, stop: &CancellationToken) -> bool {
    if latency.is_zero() {
        return stop.is_cancelled();
    }
    tokio::select! {
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(latency) => false,
    }
}

fn booked(request: &BookingRequest) -> Outcome {
    Outcome::Booked {
        seat: request.seat,
        requester: request.requester.clone(),
    }
}

fn conflict(request: &BookingRequest, reason: ConflictReason) -> Outcome {
    Outcome::Conflict {
        seat: request.seat,
        requester: request.requester.clone(),
        reason,
    }
}

impl Engine {
    pub(super) async fn allocate(
        &self,
        request: &BookingRequest,
        strategy: Strategy,
        stop: &CancellationToken,
    ) -> Result<Outcome, EngineError> {
        match strategy {
            Strategy::Optimistic => self.book_optimistic(request, stop).await,
            Strategy::Pessimistic => self.book_pessimistic(request, stop).await,
        }
    }

    /// Read the version, do the work without holding anything, then commit
    /// with a compare-and-swap against the version read. A lost race loops
    /// back to the read, up to `max_attempts` tries in total.
    ///
    /// A stop request during the work window ends the loop after the
    /// current commit attempt.
    async fn book_optimistic(
        &self,
        request: &BookingRequest,
        stop: &CancellationToken,
    ) -> Result<Outcome, EngineError> {
        let seat = request.seat;
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let seen = self.grid.read(seat)?;
            if seen.occupied {
                return Ok(conflict(request, ConflictReason::Occupied));
            }

            let interrupted = simulate_latency(self.config.latency, stop).await;

            if self.grid.commit(seat, seen.version)? {
                return Ok(booked(request));
            }
            if interrupted || attempt >= max_attempts {
                // Report what actually beat us, if it is still there.
                let reason = if self.grid.read(seat)?.occupied {
                    ConflictReason::Occupied
                } else if attempt < max_attempts {
                    ConflictReason::Stopped
                } else {
                    ConflictReason::RetriesExhausted
                };
                return Ok(conflict(request, reason));
            }
            metrics::counter!(crate::observability::OPTIMISTIC_RETRIES_TOTAL).increment(1);
            debug!(
                "{} lost commit on {seat} at v{}, retrying ({attempt}/{max_attempts})",
                request.requester, seen.version
            );
        }
    }

    /// Take the seat lock without waiting, check, work, commit, release.
    ///
    /// A busy lock is a conflict, never a wait. The lease is dropped on every
    /// path out of this function, including the future being dropped while
    /// sleeping. Once the lock is held the attempt runs to completion even if
    /// a stop is requested.
    async fn book_pessimistic(
        &self,
        request: &BookingRequest,
        stop: &CancellationToken,
    ) -> Result<Outcome, EngineError> {
        let seat = request.seat;
        let Some(lease) = self.locks.try_acquire(seat)? else {
            return Ok(conflict(request, ConflictReason::LockBusy));
        };

        let seen = self.grid.read(seat)?;
        if seen.occupied {
            self.locks.release(lease);
            return Ok(conflict(request, ConflictReason::Occupied));
        }

        if simulate_latency(self.config.latency, stop).await {
            debug!("stop requested while holding lock on {seat}; finishing attempt");
        }

        // Lock-free optimistic writers may share this seat after a strategy
        // switch, so the final write is still version-checked.
        let committed = self.grid.commit(seat, seen.version)?;
        self.locks.release(lease);

        Ok(if committed {
            booked(request)
        } else {
            conflict(request, ConflictReason::VersionMoved)
        })
    }
}
