// ── Publish queue ──
//
// Bounded buffer between hub-event processing and broker I/O, so a
// slow or disconnected broker never stalls event ingestion. Entries
// are keyed by topic: a newer value for an already-queued topic
// replaces the stale one in place instead of queueing behind it.
// Only when the queue is full of *distinct* topics is the oldest entry
// dropped (and counted).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;
use tokio::sync::Notify;
use tracing::warn;

use crate::topic::Publication;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct PublishQueue {
    entries: Mutex<IndexMap<String, Publication>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl PublishQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a publication, superseding any queued value for the
    /// same topic.
    pub fn push(&self, publication: Publication) {
        {
            let mut entries = self.entries.lock().expect("publish queue poisoned");

            if let Some(stale) = entries.get_mut(&publication.topic) {
                *stale = publication;
            } else {
                if entries.len() >= self.capacity {
                    if let Some((topic, _)) = entries.shift_remove_index(0) {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(%topic, "publish queue full, dropped oldest entry");
                    }
                }
                entries.insert(publication.topic.clone(), publication);
            }
        }
        self.notify.notify_one();
    }

    /// Dequeue the oldest publication, waiting until one is available.
    pub async fn pop(&self) -> Publication {
        loop {
            if let Some(publication) = self.try_pop() {
                return publication;
            }
            self.notify.notified().await;
        }
    }

    fn try_pop(&self) -> Option<Publication> {
        let mut entries = self.entries.lock().expect("publish queue poisoned");
        entries.shift_remove_index(0).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("publish queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries discarded because the queue was full of distinct topics.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
