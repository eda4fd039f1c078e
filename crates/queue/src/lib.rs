//! `queue` crate — in-process hand-off of run ids from producers (triggers,
//! the recurring scheduler, startup rescue) to worker loops.
//!
//! Unbounded and multi-producer / multi-consumer: `enqueue` never blocks and
//! every id is delivered to exactly one `dequeue` caller. Ordering across run
//! ids is not guaranteed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Every handle to the receiving side was dropped.
    #[error("run queue is closed")]
    Closed,

    /// Cancellation was requested while waiting for work.
    #[error("dequeue cancelled")]
    Cancelled,
}

/// Cloneable handle to the shared run queue.
#[derive(Debug, Clone)]
pub struct RunQueue {
    sender: mpsc::UnboundedSender<Uuid>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    pending: Arc<AtomicUsize>,
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RunQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Push `run_id` onto the queue without waiting.
    ///
    /// # Errors
    /// [`QueueError::Closed`] only if the receiver has been dropped, which
    /// cannot happen while any `RunQueue` clone is alive.
    pub fn enqueue(&self, run_id: Uuid) -> Result<(), QueueError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(run_id).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        debug!(%run_id, "run enqueued");
        Ok(())
    }

    /// Wait for the next run id.
    ///
    /// # Errors
    /// [`QueueError::Cancelled`] as soon as `cancel` fires, even when other
    /// consumers are holding the receiver.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<Uuid, QueueError> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            next = async {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            } => next,
        };

        let run_id = next.ok_or(QueueError::Closed)?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Ok(run_id)
    }

    /// Number of ids waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
