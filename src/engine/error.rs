use crate::model::SeatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Seat id outside `[0, seats)`. Rejected at submission, never raised by the allocator.
    InvalidResource { seat: SeatId, seats: usize },
    /// A user-entered seat number that does not parse.
    InvalidSeatLabel(String),
    LimitExceeded(&'static str),
    InvalidConfig(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidResource { seat, seats } => {
                write!(f, "invalid resource: {seat} (grid has {seats} seats)")
            }
            EngineError::InvalidSeatLabel(raw) => write!(f, "invalid seat number: {raw:?}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
