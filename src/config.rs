use std::time::Duration;

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::Strategy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub rows: u32,
    pub cols: u32,
    /// Workers spawned per processing pass.
    pub workers: usize,
    /// Simulated validation work inside every allocation attempt.
    pub latency: Duration,
    /// Optimistic attempts per request, first try included.
    pub max_attempts: u32,
    /// Pause after each processed request, per worker.
    pub pacing: Duration,
    /// Strategy in effect at startup.
    pub strategy: Strategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            workers: 5,
            latency: Duration::from_millis(100),
            max_attempts: 3,
            pacing: Duration::ZERO,
            strategy: Strategy::Optimistic,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl EngineConfig {
    /// Defaults overridden by `SEATLOCK_*` environment variables. Unset or
    /// unparsable values keep the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            rows: env_parse("SEATLOCK_ROWS").unwrap_or(d.rows),
            cols: env_parse("SEATLOCK_COLS").unwrap_or(d.cols),
            workers: env_parse("SEATLOCK_WORKERS").unwrap_or(d.workers),
            latency: env_parse("SEATLOCK_LATENCY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.latency),
            max_attempts: env_parse("SEATLOCK_MAX_ATTEMPTS").unwrap_or(d.max_attempts),
            pacing: env_parse("SEATLOCK_PACING_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.pacing),
            strategy: env_parse("SEATLOCK_STRATEGY").unwrap_or(d.strategy),
        }
    }

    pub fn seats(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(EngineError::InvalidConfig("grid dimensions must be non-zero"));
        }
        if self.seats() > MAX_SEATS {
            return Err(EngineError::InvalidConfig("grid too large"));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(EngineError::InvalidConfig("worker count out of range"));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            return Err(EngineError::InvalidConfig("max_attempts out of range"));
        }
        if self.latency > MAX_LATENCY {
            return Err(EngineError::InvalidConfig("latency too long"));
        }
        if self.pacing > MAX_PACING {
            return Err(EngineError::InvalidConfig("pacing too long"));
        }
        Ok(())
    }
}
