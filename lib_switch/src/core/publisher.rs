//! # Live-State Publisher
//!
//! Fans every published [`Snapshot`] out to the connected viewers.
//!
//! ## How it works
//!
//! - **Shared frames**: a snapshot is wrapped in an `Arc` once and every
//!   subscriber receives a pointer to the same allocation.
//! - **Bounded queues**: each subscriber owns its own `mpsc` queue. Sends use
//!   `try_send`, so a full queue drops that update for that subscriber only and
//!   the producer never waits.
//! - **Seeding**: a new queue receives nothing until it is seeded with its
//!   initial table. A publish arriving before that only marks the queue, and
//!   [`Publisher::try_seed`] then refuses the initial table read before it, so
//!   the caller reads again.
//! - **Cleanup**: a subscriber whose receiver is gone is removed during the
//!   next publish. Dropping a [`Subscription`] deregisters it immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::Snapshot;

struct Slot {
    tx: mpsc::Sender<Arc<Snapshot>>,
    seeded: bool,
    // Set when a publish skipped this slot before it was seeded.
    missed: bool,
}

type Slots = HashMap<u64, Slot>;

/// Registry of live subscribers behind a single lock.
pub struct Publisher {
    subscribers: Mutex<Slots>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Publisher {
    /// `capacity` is the per-subscriber queue depth; zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding this lock leaves the map itself intact.
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// # Subscribe
    ///
    /// Registers a new viewer with an empty, unseeded queue. Nothing reaches
    /// it until [`seed`](Self::seed) or a successful [`try_seed`](Self::try_seed)
    /// gives it its first table.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Slot {
            tx,
            seeded: false,
            missed: false,
        };

        let total = {
            let mut subscribers = self.lock();
            subscribers.insert(id, slot);
            subscribers.len()
        };
        info!(subscriber = id, total, "Subscriber registered");

        Subscription {
            id,
            rx,
            publisher: Arc::clone(self),
        }
    }

    /// Seeds subscriber `id` with `initial` unless a publish arrived since it
    /// registered. Returns `false` in that case, and the caller should read the
    /// table again.
    pub fn try_seed(&self, id: u64, initial: Snapshot) -> bool {
        let mut subscribers = self.lock();
        let Some(slot) = subscribers.get_mut(&id) else {
            return true;
        };
        if slot.missed {
            slot.missed = false;
            return false;
        }
        Self::seed_slot(slot, initial);
        true
    }

    /// Seeds subscriber `id` with `initial` unconditionally.
    pub fn seed(&self, id: u64, initial: Snapshot) {
        if let Some(slot) = self.lock().get_mut(&id) {
            Self::seed_slot(slot, initial);
        }
    }

    fn seed_slot(slot: &mut Slot, initial: Snapshot) {
        slot.seeded = true;
        slot.missed = false;
        // Unseeded queues are empty, so the first send always fits.
        let _ = slot.tx.try_send(Arc::new(initial));
    }

    /// # Publish
    ///
    /// Pushes `snapshot` to every seeded subscriber without blocking. Returns
    /// the number of subscribers that accepted it.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        let frame = Arc::new(snapshot);
        let mut delivered = 0;

        let mut subscribers = self.lock();
        subscribers.retain(|id, slot| {
            if !slot.seeded {
                slot.missed = true;
                return !slot.tx.is_closed();
            }
            match slot.tx.try_send(Arc::clone(&frame)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = *id, "Subscriber queue full, dropping update");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    info!(subscriber = *id, "Subscriber gone, removing");
                    false
                }
            }
        });
        delivered
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            info!(subscriber = id, "Subscriber deregistered");
        } else {
            warn!(subscriber = id, "Deregistering unknown subscriber");
        }
    }
}

/// A viewer's end of the publisher. Dropping it deregisters the viewer and
/// releases its queue.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<Snapshot>>,
    publisher: Arc<Publisher>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next snapshot.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }

    /// Returns a queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.publisher.remove(self.id);
    }
}
