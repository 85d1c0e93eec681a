use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::engine::EngineError;
use crate::model::SeatId;

struct LockSlot {
    gate: Arc<Mutex<()>>,
    holders: AtomicUsize,
    peak_holders: AtomicUsize,
}

/// One exclusive lock per seat, allocated once at startup.
///
/// Only the pessimistic strategy acquires these. Acquisition never blocks
/// or queues: a held lock means "unavailable right now".
pub struct LockTable {
    slots: Box<[Arc<LockSlot>]>,
}

/// Proof of holding a seat lock. Dropping it releases the lock, so every
/// exit path (early return, cancelled future, aborted task) releases it.
pub struct SeatLease {
    seat: SeatId,
    slot: Arc<LockSlot>,
    _guard: OwnedMutexGuard<()>,
}

impl SeatLease {
    pub fn seat(&self) -> SeatId {
        self.seat
    }
}

impl Drop for SeatLease {
    fn drop(&mut self) {
        // Runs before `_guard` is dropped, i.e. while the lock is still held.
        self.slot.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

impl LockTable {
    pub fn new(len: usize) -> Self {
        let slots = (0..len)
            .map(|_| {
                Arc::new(LockSlot {
                    gate: Arc::new(Mutex::new(())),
                    holders: AtomicUsize::new(0),
                    peak_holders: AtomicUsize::new(0),
                })
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, seat: SeatId) -> Result<&Arc<LockSlot>, EngineError> {
        self.slots.get(seat.index()).ok_or(EngineError::InvalidResource {
            seat,
            seats: self.slots.len(),
        })
    }

    /// Non-blocking test-and-set. `Ok(None)` when another holder has it.
    pub fn try_acquire(&self, seat: SeatId) -> Result<Option<SeatLease>, EngineError> {
        let slot = self.slot(seat)?;
        let Ok(guard) = slot.gate.clone().try_lock_owned() else {
            return Ok(None);
        };
        let holders = slot.holders.fetch_add(1, Ordering::AcqRel) + 1;
        slot.peak_holders.fetch_max(holders, Ordering::AcqRel);
        Ok(Some(SeatLease {
            seat,
            slot: slot.clone(),
            _guard: guard,
        }))
    }

    /// Explicit release; equivalent to dropping the lease.
    pub fn release(&self, lease: SeatLease) {
        drop(lease);
    }

    pub fn is_held(&self, seat: SeatId) -> bool {
        self.slot(seat)
            .map(|s| s.holders.load(Ordering::Acquire) > 0)
            .unwrap_or(false)
    }

    /// Highest number of simultaneous holders ever observed on this seat.
    pub fn peak_holders(&self, seat: SeatId) -> usize {
        self.slot(seat)
            .map(|s| s.peak_holders.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}
