//! Background index maintenance tasks.
//!
//! The manager only enqueues units of work; a single worker thread drains
//! the channel and applies them against the shared approximate index.
//! Delivery is at-least-once: a failed task is retried once before being
//! dropped with an error log. When no worker is running, tasks apply
//! inline on the caller's thread.

use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, error, warn};

use crate::error::StoreResult;
use crate::types::VectorId;

/// A unit of index maintenance work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTask {
    /// Bulk-populate the approximate index from the full record set.
    Backfill,
    /// Add one record's vector to the approximate index.
    Add(VectorId),
    /// Re-embed one record's vector in the approximate index.
    Update(VectorId),
    /// Retract one id from the approximate index.
    Remove(VectorId),
}

/// Channel-fed worker applying [`IndexTask`]s in submission order.
pub struct TaskQueue {
    tx: Option<Sender<IndexTask>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawns the worker thread. `apply` runs once per task, twice when
    /// the first attempt fails.
    pub fn start<F>(apply: F) -> Self
    where
        F: Fn(&IndexTask) -> StoreResult<()> + Send + 'static,
    {
        let (tx, rx) = unbounded::<IndexTask>();
        let worker = std::thread::spawn(move || {
            while let Ok(task) = rx.recv() {
                debug!(?task, "applying index task");
                if let Err(first) = apply(&task) {
                    warn!(?task, error = %first, "index task failed, retrying once");
                    if let Err(second) = apply(&task) {
                        error!(?task, error = %second, "index task dropped after retry");
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Enqueues a task. Submission never blocks; ordering is FIFO.
    pub fn submit(&self, task: IndexTask) {
        if let Some(tx) = &self.tx {
            // Send only fails when the worker is gone, which means we are
            // mid-shutdown; the task is dropped with the queue.
            let _ = tx.send(task);
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Disconnect the channel so the worker loop exits, then join.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
