//! Deduplicating work queue
//!
//! Producers (the initial directory scan and the watcher) call
//! [`DedupQueue::put`] from any thread. A single subscriber receives every
//! pending item exactly once. An item that is already pending is not queued a
//! second time; once it has been handed to the subscriber it may be queued
//! again.

use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Multi-producer, single-consumer queue that collapses duplicate pending items
pub struct DedupQueue<T> {
    pending: Arc<DashSet<T>>,
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<T>>>>,
}

impl<T> Clone for DedupQueue<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> DedupQueue<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pending: Arc::new(DashSet::new()),
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Queue an item unless it is already pending.
    ///
    /// Returns `true` if the item was queued.
    pub fn put(&self, item: T) -> bool {
        // Check and insert happen under one shard lock
        if !self.pending.insert(item.clone()) {
            trace!(?item, "Already pending");
            return false;
        }
        if self.tx.send(item).is_err() {
            trace!("Queue consumer is gone");
        }
        true
    }

    /// Check whether an item waits for delivery
    #[must_use]
    pub fn is_pending(&self, item: &T) -> bool {
        self.pending.contains(item)
    }

    /// Number of items waiting for delivery
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Start the consumer task.
    ///
    /// `on_item` runs for one item at a time. The loop ends when `cancel`
    /// fires or every queue handle has been dropped and the backlog is
    /// drained. An item being processed when `cancel` fires is finished first.
    ///
    /// # Errors
    /// Returns [`Error::AlreadySubscribed`] on the second call.
    pub fn subscribe<F, Fut>(&self, cancel: CancellationToken, mut on_item: F) -> Result<JoinHandle<()>>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadySubscribed)?;
        let pending = Arc::clone(&self.pending);

        Ok(tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };
                pending.remove(&item);
                on_item(item).await;
            }
            trace!("Queue consumer stopped");
        }))
    }
}

impl<T> Default for DedupQueue<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
