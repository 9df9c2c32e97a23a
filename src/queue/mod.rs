//! Durable FIFO of outbound alert messages.
//!
//! Every mutation rewrites the whole JSON artifact before the call returns, so
//! a crash loses at most the mutation in flight. Messages leave the queue only
//! through [`PersistentQueue::flush_after_delivery`], after the gateway has
//! confirmed them.

mod store;

pub use store::QueueStore;

use crate::error::Result;
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

pub struct PersistentQueue {
    messages: Mutex<VecDeque<String>>,
    available: Notify,
    store: QueueStore,
}

impl PersistentQueue {
    /// Create an empty queue backed by `path`, ignoring any existing artifact
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_messages(QueueStore::new(path), VecDeque::new())
    }

    /// Restore the queue from its artifact.
    ///
    /// A missing artifact means an empty queue. An unreadable or corrupt one is
    /// logged and also treated as empty; it is overwritten by the next flush.
    pub async fn load<P: AsRef<Path>>(path: P) -> Self {
        let store = QueueStore::new(path);

        let messages = match store.read().await {
            Ok(Some(messages)) => {
                info!(
                    "Loaded {} unsent message(s) from {}",
                    messages.len(),
                    store.path().display()
                );
                VecDeque::from(messages)
            }
            Ok(None) => {
                info!(
                    "No persistent queue at {}, starting with an empty queue",
                    store.path().display()
                );
                VecDeque::new()
            }
            Err(e) => {
                error!(
                    "Failed to load persistent queue {}: {}. Starting fresh queue",
                    store.path().display(),
                    e
                );
                VecDeque::new()
            }
        };

        Self::with_messages(store, messages)
    }

    fn with_messages(store: QueueStore, messages: VecDeque<String>) -> Self {
        Self {
            messages: Mutex::new(messages),
            available: Notify::new(),
            store,
        }
    }

    /// Append a message and persist the queue.
    ///
    /// The message stays queued in memory even when persisting fails; the
    /// error is returned so the caller can report it.
    pub async fn enqueue(&self, message: String) -> Result<()> {
        let mut messages = self.messages.lock().await;
        messages.push_back(message);
        let result = self.store.write(&messages).await;
        drop(messages);

        self.available.notify_one();

        if let Err(e) = &result {
            warn!("Queued message is held in memory only: {}", e);
        }
        result
    }

    /// Wait until a message is pending and return the oldest one.
    ///
    /// The message stays at the head of the queue until
    /// [`flush_after_delivery`](Self::flush_after_delivery) is called. Only the
    /// delivery worker may call this.
    pub async fn dequeue_blocking(&self) -> String {
        loop {
            {
                let messages = self.messages.lock().await;
                if let Some(head) = messages.front() {
                    return head.clone();
                }
            }
            self.available.notified().await;
        }
    }

    /// Drop the delivered head message and persist the shorter queue.
    ///
    /// The head is dropped from memory even if persisting fails.
    pub async fn flush_after_delivery(&self) -> Result<Option<String>> {
        let mut messages = self.messages.lock().await;
        let delivered = messages.pop_front();
        self.store.write(&messages).await?;
        Ok(delivered)
    }

    /// Persist the current contents without mutating them
    pub async fn flush(&self) -> Result<()> {
        let messages = self.messages.lock().await;
        self.store.write(&messages).await
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Pending messages in delivery order
    pub async fn snapshot(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }
}
