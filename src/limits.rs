use std::time::Duration;

/// Largest grid the engine will build (rows * cols).
pub const MAX_SEATS: usize = 1_000_000;

/// Upper bound on the dispatcher pool size.
pub const MAX_WORKERS: usize = 256;

/// Upper bound on the simulated processing latency.
pub const MAX_LATENCY: Duration = Duration::from_secs(60);

/// Upper bound on the inter-request pacing delay.
pub const MAX_PACING: Duration = Duration::from_secs(60);

/// Optimistic attempts are capped here regardless of configuration.
pub const MAX_ATTEMPTS: u32 = 64;

pub const MAX_REQUESTER_LEN: usize = 128;

/// Capacity of the observer broadcast ring. Slower observers lag and drop.
pub const NOTIFY_CHANNEL_CAPACITY: usize = 1024;
