//! Dispatch queue between the subscriber and the worker pool.
//!
//! Unbounded, strictly FIFO, and every item is handed to exactly one
//! consumer. Workers block in [`DispatchQueue::pop`] instead of polling.

use async_channel::{Receiver, Sender, TryRecvError, unbounded};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::WorkItem;

/// Cloneable handle to the shared queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Append an item at the tail.
    pub fn push(&self, item: WorkItem) -> Result<()> {
        self.tx.try_send(item).map_err(|_| Error::QueueClosed)
    }

    /// Take the head item if there is one, without waiting.
    pub fn try_pop(&self) -> Option<WorkItem> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Wait for the head item until `token` is cancelled.
    ///
    /// Cancellation wins over a ready item: after the token fires this
    /// never hands out another item.
    pub async fn pop(&self, token: &CancellationToken) -> Option<WorkItem> {
        if token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            received = self.rx.recv() => received.ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
