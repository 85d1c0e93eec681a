use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Microseconds since the Unix epoch. Log keys are stamped with these.
pub type Micros = u64;

/// Flattened, zero-based seat index in row-major order: `row * cols + col`.
///
/// Users see seats 1-based (the "label"), so seat id 0 is shown as `seat 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(pub u32);

impl SeatId {
    pub fn from_row_col(row: u32, col: u32, cols: u32) -> Self {
        Self(row * cols + col)
    }

    /// 1-based seat number as printed in log messages.
    pub fn label(self) -> u32 {
        self.0 + 1
    }

    pub fn from_label(label: u32) -> Option<Self> {
        label.checked_sub(1).map(SeatId)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn row(self, cols: u32) -> u32 {
        self.0 / cols
    }

    pub fn col(self, cols: u32) -> u32 {
        self.0 % cols
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat {}", self.label())
    }
}

/// Concurrency-control discipline applied to the next dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Read version, simulate work without locks, commit by compare-and-swap.
    Optimistic,
    /// Take the seat lock (non-blocking), then check and commit under it.
    Pessimistic,
}

impl Strategy {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Strategy::Optimistic => 0,
            Strategy::Pessimistic => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Strategy::Pessimistic,
            _ => Strategy::Optimistic,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Optimistic => f.write_str("optimistic"),
            Strategy::Pessimistic => f.write_str("pessimistic"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" | "occ" => Ok(Strategy::Optimistic),
            "pessimistic" | "lock" => Ok(Strategy::Pessimistic),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Consistent `(occupied, version)` pair read from one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatState {
    pub occupied: bool,
    pub version: u64,
}

/// One pending allocation request. Never mutated after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Ulid,
    pub requester: String,
    pub seat: SeatId,
}

impl BookingRequest {
    pub fn new(requester: impl Into<String>, seat: SeatId) -> Self {
        Self {
            id: Ulid::new(),
            requester: requester.into(),
            seat,
        }
    }
}

/// Why an allocation attempt ended in a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The seat was already booked at the decisive read.
    Occupied,
    /// Another worker held the seat lock.
    LockBusy,
    /// Every optimistic attempt lost its compare-and-swap.
    RetriesExhausted,
    /// The version moved under a held lock (a lock-free writer got there first).
    VersionMoved,
    /// The pass was stopped after a lost commit, with retries left unused.
    Stopped,
}

impl ConflictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictReason::Occupied => "occupied",
            ConflictReason::LockBusy => "lock_busy",
            ConflictReason::RetriesExhausted => "retries_exhausted",
            ConflictReason::VersionMoved => "version_moved",
            ConflictReason::Stopped => "stopped",
        }
    }
}

/// Result of processing one dequeued request, or of one cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Booked {
        seat: SeatId,
        requester: String,
    },
    Conflict {
        seat: SeatId,
        requester: String,
        reason: ConflictReason,
    },
    Released {
        seat: SeatId,
    },
}

impl Outcome {
    pub fn seat(&self) -> SeatId {
        match self {
            Outcome::Booked { seat, .. }
            | Outcome::Conflict { seat, .. }
            | Outcome::Released { seat } => *seat,
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(self, Outcome::Booked { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Outcome::Conflict { .. })
    }

    /// Short label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Booked { .. } => "booked",
            Outcome::Conflict { .. } => "conflict",
            Outcome::Released { .. } => "released",
        }
    }

    /// Human-readable log line.
    pub fn message(&self) -> String {
        match self {
            Outcome::Booked { seat, .. } => format!("Booked {seat}"),
            Outcome::Conflict { seat, .. } => format!("Failed to book {seat}"),
            Outcome::Released { seat } => format!("Cancelled {seat}"),
        }
    }
}

/// Unique log key: who acted, and a strictly increasing timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogKey {
    pub stamp: Micros,
    pub requester: String,
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.requester, self.stamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: LogKey,
    pub outcome: Outcome,
    pub message: String,
}

/// Point-in-time copy of every seat. Each cell is read atomically; the grid
/// as a whole is not a single atomic snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub rows: u32,
    pub cols: u32,
    pub seats: Vec<SeatState>,
}

impl GridSnapshot {
    pub fn get(&self, seat: SeatId) -> Option<SeatState> {
        self.seats.get(seat.index()).copied()
    }

    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| s.occupied).count()
    }

    /// One string per row, `X` for booked and `.` for free.
    pub fn render_rows(&self) -> Vec<String> {
        self.seats
            .chunks(self.cols.max(1) as usize)
            .map(|row| row.iter().map(|s| if s.occupied { 'X' } else { '.' }).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub booked: u64,
    pub conflicts: u64,
    pub released: u64,
}

impl StatsSnapshot {
    /// Requests fully dequeued and processed.
    pub fn processed(&self) -> u64 {
        self.booked + self.conflicts
    }
}

/// Result of an explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Released,
    /// The seat was free; nothing changed.
    NotBooked,
}

/// Informational message for the user, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    NotBooked { seat: SeatId },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NotBooked { seat } => write!(f, "{seat} is not booked"),
        }
    }
}
