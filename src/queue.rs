use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::BookingRequest;

/// Unbounded FIFO of pending requests shared by producers and workers.
///
/// Critical sections are a single push or pop; callers never lock externally.
pub struct RequestQueue {
    inner: Mutex<VecDeque<BookingRequest>>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BookingRequest>> {
        // A panicking holder cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the queue depth after the push.
    pub fn push(&self, request: BookingRequest) -> usize {
        let mut q = self.lock();
        q.push_back(request);
        q.len()
    }

    /// Non-blocking; `None` when empty.
    pub fn pop(&self) -> Option<BookingRequest> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pending requests in submission order.
    pub fn snapshot(&self) -> Vec<BookingRequest> {
        self.lock().iter().cloned().collect()
    }
}
