use rand::Rng;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::SeatId;

/// Requests per "simulate booking" round.
pub const DEFAULT_BATCH: usize = 5;

/// Enqueue `count` requests from `User1`..`User{count}` at uniformly random
/// seats. Seats may repeat, which is the point: repeats contend.
pub fn simulate_requests<R: Rng + ?Sized>(
    engine: &Engine,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Ulid>, EngineError> {
    let seats = engine.grid.len() as u32;
    (0..count)
        .map(|i| {
            let seat = SeatId(rng.gen_range(0..seats));
            engine.submit(&format!("User{}", i + 1), seat)
        })
        .collect()
}

/// A random currently-booked seat, if any.
pub fn random_booked_seat<R: Rng + ?Sized>(engine: &Engine, rng: &mut R) -> Option<SeatId> {
    let booked: Vec<SeatId> = engine
        .snapshot()
        .seats
        .iter()
        .enumerate()
        .filter(|(_, s)| s.occupied)
        .map(|(i, _)| SeatId(i as u32))
        .collect();
    if booked.is_empty() {
        return None;
    }
    Some(booked[rng.gen_range(0..booked.len())])
}
