use crate::error::ScanError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use sweep_data::{Scan, ScanSequence};

pub type SubscriberId = u64;

/// Outcome of one acquisition cycle as seen by subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum Published {
    Scan {
        seq: ScanSequence,
        scan: Arc<Scan>,
    },
    Error {
        seq: ScanSequence,
        error: ScanError,
    },
}

impl Published {
    pub fn seq(&self) -> ScanSequence {
        match self {
            Published::Scan { seq, .. } | Published::Error { seq, .. } => *seq,
        }
    }
}

/// One-item buffer holding the latest item not yet taken by its subscriber.
struct Slot {
    tx: Sender<Published>,
    // Kept so the publisher can evict a stale item before writing a new one.
    rx: Receiver<Published>,
}

impl Slot {
    fn new() -> Slot {
        let (tx, rx) = bounded(1);
        Slot { tx, rx }
    }

    fn overwrite(&self, item: Published) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                let _ = self.rx.try_recv();
                // Only the publisher writes, so the slot has room now.
                let _ = self.tx.try_send(item);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Handle returned by [`Distributor::register`].
pub struct Registration {
    pub id: SubscriberId,
    slot: Receiver<Published>,
}

impl Registration {
    /// Takes the latest published item, if one arrived since the last call.
    pub fn latest(&self) -> Option<Published> {
        self.slot.try_recv().ok()
    }
}

/// Fan-out point between the acquisition loop and subscribers.
///
/// Every subscriber owns a one-item slot. Publishing overwrites each slot, so
/// a slow subscriber loses intermediate items instead of queuing them.
pub struct Distributor {
    slots: Mutex<HashMap<SubscriberId, Slot>>,
    next_id: AtomicU64,
    last_published_seq: AtomicU64,
    last_scan_seq: AtomicU64,
}

impl Default for Distributor {
    fn default() -> Self {
        Distributor::new()
    }
}

impl Distributor {
    pub fn new() -> Distributor {
        Distributor {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            last_published_seq: AtomicU64::new(0),
            last_scan_seq: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SubscriberId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a subscriber. It only observes items published afterwards.
    pub fn register(&self) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Slot::new();
        let rx = slot.rx.clone();
        self.slots().insert(id, slot);
        log::debug!("Registered subscriber {}", id);
        Registration { id, slot: rx }
    }

    /// Removes a subscriber. Returns false if it was already removed.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.slots().remove(&id).is_some();
        if removed {
            log::debug!("Unregistered subscriber {}", id);
        }
        removed
    }

    /// Writes `item` into every registered slot and returns how many were
    /// written. Items must arrive in increasing sequence order; anything
    /// else is dropped.
    pub fn publish(&self, item: Published) -> usize {
        let seq = item.seq();
        let slots = self.slots();
        let last = self.last_published_seq.load(Ordering::Acquire);
        if seq <= last {
            log::warn!(
                "Dropping out-of-order item #{} (last published #{})",
                seq,
                last
            );
            return 0;
        }
        self.last_published_seq.store(seq, Ordering::Release);
        if let Published::Scan { .. } = item {
            self.last_scan_seq.store(seq, Ordering::Release);
        }

        for slot in slots.values() {
            slot.overwrite(item.clone());
        }
        slots.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots().len()
    }

    /// Sequence of the last successfully produced scan. Errors never advance it.
    pub fn last_scan_seq(&self) -> Option<ScanSequence> {
        match self.last_scan_seq.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }
}
