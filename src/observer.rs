use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{BookingRequest, GridSnapshot, LogEntry, Notice};

/// Receiving end of engine notifications (a renderer, a log sink, a test recorder).
///
/// Callbacks run on the observer's own delivery task (see
/// [`crate::notify::spawn_observer`]), never on a dispatcher worker.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    async fn on_state_changed(&self, grid: &GridSnapshot, pending: &[BookingRequest]);

    async fn on_log_appended(&self, entry: &LogEntry);

    async fn on_notice(&self, _notice: &Notice) {}
}

/// Writes outcomes through `tracing`; grid rows go to debug.
#[derive(Debug, Default)]
pub struct TracingObserver;

#[async_trait]
impl Observer for TracingObserver {
    async fn on_state_changed(&self, grid: &GridSnapshot, pending: &[BookingRequest]) {
        debug!(
            "grid {}x{}: {} booked, {} pending",
            grid.rows,
            grid.cols,
            grid.occupied_count(),
            pending.len()
        );
        for (i, row) in grid.render_rows().iter().enumerate() {
            debug!("  row {i:>3} {row}");
        }
    }

    async fn on_log_appended(&self, entry: &LogEntry) {
        info!("[{}] {}", entry.key, entry.message);
    }

    async fn on_notice(&self, notice: &Notice) {
        info!("notice: {notice}");
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonLine<'a> {
    StateChanged {
        grid: &'a GridSnapshot,
        pending: &'a [BookingRequest],
    },
    LogAppended {
        entry: &'a LogEntry,
    },
    Notice {
        notice: &'a Notice,
    },
}

/// One JSON object per notification, newline-delimited.
pub struct JsonLinesObserver<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, line: &JsonLine<'_>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let result = serde_json::to_writer(&mut *out, line)
            .map_err(std::io::Error::from)
            .and_then(|()| out.write_all(b"\n"))
            .and_then(|()| out.flush());
        if let Err(e) = result {
            warn!("json observer write failed: {e}");
        }
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Observer for JsonLinesObserver<W> {
    async fn on_state_changed(&self, grid: &GridSnapshot, pending: &[BookingRequest]) {
        self.emit(&JsonLine::StateChanged { grid, pending });
    }

    async fn on_log_appended(&self, entry: &LogEntry) {
        self.emit(&JsonLine::LogAppended { entry });
    }

    async fn on_notice(&self, notice: &Notice) {
        self.emit(&JsonLine::Notice { notice });
    }
}
