use std::sync::{Arc, PoisonError};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::Engine;

/// One run of the worker pool: workers drain the queue and exit when it is
/// empty or when the pass is stopped.
pub(super) struct DispatchPass {
    stop: CancellationToken,
    workers: TaskTracker,
}

impl DispatchPass {
    fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }
}

/// Pop until the queue is empty or a stop is requested. The strategy is
/// re-read for every request so a switch applies from the next pop on.
async fn run_worker(engine: Arc<Engine>, worker: usize, stop: CancellationToken) {
    metrics::gauge!(crate::observability::WORKERS_ACTIVE).increment(1.0);
    let pacing = engine.config.pacing;
    let mut handled = 0usize;

    while !stop.is_cancelled() {
        let Some(request) = engine.queue.pop() else {
            break;
        };
        metrics::gauge!(crate::observability::QUEUE_DEPTH).set(engine.queue.len() as f64);

        let strategy = engine.strategy();
        match engine.process_with(&request, strategy, &stop).await {
            Ok(_) => handled += 1,
            // Seats are validated on submit, the only way into the queue.
            Err(e) => warn!("worker {worker} dropped request {}: {e}", request.id),
        }

        if !pacing.is_zero() {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(pacing) => {}
            }
        }
    }

    metrics::gauge!(crate::observability::WORKERS_ACTIVE).decrement(1.0);
    tracing::debug!("worker {worker} finished pass after {handled} requests");
}

impl Engine {
    /// Spawn a pass of `config.workers` workers on the current tokio runtime.
    /// Returns false if a pass is already running.
    pub fn start_processing(self: &Arc<Self>) -> bool {
        let mut slot = self.pass.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(DispatchPass::is_running) {
            return false;
        }

        let pass = DispatchPass {
            stop: CancellationToken::new(),
            workers: TaskTracker::new(),
        };
        for worker in 0..self.config.workers {
            pass.workers
                .spawn(run_worker(self.clone(), worker, pass.stop.clone()));
        }
        pass.workers.close();

        info!(
            "processing started: {} workers, {} pending, strategy {}",
            self.config.workers,
            self.queue.len(),
            self.strategy()
        );
        *slot = Some(pass);
        true
    }

    /// Ask the running pass to stop and wait for its workers. Each worker
    /// finishes the request it holds; the rest stay queued.
    pub async fn stop_processing(&self) {
        let pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(pass) = pass else { return };
        pass.stop.cancel();
        pass.workers.wait().await;
        info!("processing stopped, {} still pending", self.queue.len());
    }

    /// Wait until the running pass has emptied the queue and exited.
    pub async fn drain(&self) {
        let workers = self
            .pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|p| p.workers.clone());
        if let Some(workers) = workers {
            workers.wait().await;
        }
    }

    pub fn is_processing(&self) -> bool {
        self.pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(DispatchPass::is_running)
    }
}
