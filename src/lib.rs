//! Concurrent seat reservation with switchable concurrency control.
//!
//! Producers [`submit`](engine::Engine::submit) requests into a FIFO queue;
//! a pool of tokio workers drains it, booking each seat either optimistically
//! (version read + compare-and-swap commit, bounded retries) or
//! pessimistically (non-blocking per-seat lock). Outcomes are counted,
//! logged, and broadcast to observers.

pub mod config;
pub mod engine;
pub mod grid;
pub mod limits;
pub mod locks;
pub mod model;
pub mod notify;
pub mod observability;
pub mod observer;
pub mod queue;
pub mod sim;
pub mod stats;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError};
pub use model::*;
pub use notify::{Notification, NotifyHub, spawn_observer};
pub use observer::{JsonLinesObserver, Observer, TracingObserver};
