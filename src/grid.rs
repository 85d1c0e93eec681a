use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::EngineError;
use crate::model::{GridSnapshot, SeatId, SeatState};

const OCCUPIED: u64 = 1;

/// Versions live in the upper 63 bits of a cell word.
const MAX_VERSION: u64 = u64::MAX >> 1;

fn pack(state: SeatState) -> u64 {
    (state.version << 1) | u64::from(state.occupied)
}

fn unpack(word: u64) -> SeatState {
    SeatState {
        occupied: word & OCCUPIED != 0,
        version: word >> 1,
    }
}

/// Authoritative seat state: a fixed arena of cells, one word per seat.
///
/// Each word packs `(version << 1) | occupied`, so a cell is read and
/// transitioned with a single atomic operation and no caller can observe a
/// torn `(occupied, version)` pair. `commit` and `release` are
/// compare-and-swap transitions and linearize against each other and
/// against `read`.
pub struct SeatGrid {
    rows: u32,
    cols: u32,
    cells: Box<[AtomicU64]>,
}

impl SeatGrid {
    pub fn new(rows: u32, cols: u32) -> Self {
        let len = rows as usize * cols as usize;
        let cells = (0..len).map(|_| AtomicU64::new(0)).collect();
        Self { rows, cols, cells }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn check(&self, seat: SeatId) -> Result<(), EngineError> {
        self.cell(seat).map(|_| ())
    }

    fn cell(&self, seat: SeatId) -> Result<&AtomicU64, EngineError> {
        self.cells.get(seat.index()).ok_or(EngineError::InvalidResource {
            seat,
            seats: self.cells.len(),
        })
    }

    pub fn read(&self, seat: SeatId) -> Result<SeatState, EngineError> {
        Ok(unpack(self.cell(seat)?.load(Ordering::Acquire)))
    }

    /// Book the seat iff it is free and still at `expected_version`.
    /// On success the version becomes `expected_version + 1`.
    pub fn commit(&self, seat: SeatId, expected_version: u64) -> Result<bool, EngineError> {
        let cell = self.cell(seat)?;
        if expected_version >= MAX_VERSION {
            return Ok(false);
        }
        let current = pack(SeatState { occupied: false, version: expected_version });
        let next = pack(SeatState { occupied: true, version: expected_version + 1 });
        Ok(cell
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Free the seat iff it is booked, bumping the version.
    /// Returns false (and changes nothing) when the seat is already free.
    pub fn release(&self, seat: SeatId) -> Result<bool, EngineError> {
        let cell = self.cell(seat)?;
        let result = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            let state = unpack(word);
            if !state.occupied || state.version >= MAX_VERSION {
                return None;
            }
            Some(pack(SeatState { occupied: false, version: state.version + 1 }))
        });
        Ok(result.is_ok())
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            seats: self
                .cells
                .iter()
                .map(|c| unpack(c.load(Ordering::Acquire)))
                .collect(),
        }
    }
}
