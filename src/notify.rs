use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::limits::NOTIFY_CHANNEL_CAPACITY;
use crate::model::{BookingRequest, GridSnapshot, LogEntry, Notice};
use crate::observer::Observer;

/// Everything the rendering side is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// `seq` is drawn from [`NotifyHub::next_state_seq`] before the snapshot
    /// is built; a higher `seq` never shows an older grid.
    StateChanged {
        seq: u64,
        grid: Arc<GridSnapshot>,
        pending: Arc<Vec<BookingRequest>>,
    },
    LogAppended {
        entry: LogEntry,
    },
    Notice {
        notice: Notice,
    },
}

/// Fire-and-forget fan-out to observers.
///
/// Sending never blocks the dispatcher: the broadcast ring overwrites the
/// oldest notification when an observer falls behind.
pub struct NotifyHub {
    sender: broadcast::Sender<Notification>,
    state_seq: AtomicU64,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFY_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            state_seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Callers skip building expensive payloads when this is false.
    pub fn has_listeners(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Sequence for the next `StateChanged`. Must be taken before reading
    /// the state it describes: every mutation that finished before this call
    /// is then visible to the snapshot, and to every later-numbered one.
    pub fn next_state_seq(&self) -> u64 {
        self.state_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

/// Forward hub notifications to `observer` on a dedicated task until the hub
/// is dropped. Publishers race, so a `StateChanged` can arrive after a newer
/// one; anything at or below the last delivered `seq` is discarded. Lagged
/// notifications are counted and skipped: the ring keeps the newest entries,
/// which include the highest `seq`, so the last delivered grid is current.
pub fn spawn_observer<O>(hub: &NotifyHub, observer: Arc<O>) -> JoinHandle<()>
where
    O: Observer + ?Sized,
{
    let mut rx = hub.subscribe();
    tokio::spawn(async move {
        let mut last_state = 0;
        loop {
            match rx.recv().await {
                Ok(Notification::StateChanged { seq, grid, pending }) => {
                    if seq <= last_state {
                        continue;
                    }
                    last_state = seq;
                    observer.on_state_changed(&grid, &pending).await;
                }
                Ok(Notification::LogAppended { entry }) => {
                    observer.on_log_appended(&entry).await;
                }
                Ok(Notification::Notice { notice }) => {
                    observer.on_notice(&notice).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("observer lagged, dropped {skipped} notifications");
                    metrics::counter!(crate::observability::NOTIFICATIONS_DROPPED_TOTAL)
                        .increment(skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
