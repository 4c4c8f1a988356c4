//! Copy-on-write ordered list of the consumers attached to a queue.

use crate::lockgroup::{ConsumerId, LockGroupManager};
use crate::subscription::SubscriptionBoxed;
use std::sync::{Arc, Mutex, RwLock};

/// Readers take a cheap `Arc` snapshot of the current consumer list and
/// never block a concurrent insert/remove. Mutations serialize through
/// `write_lock` and replace the whole list.
pub struct SubscriptionRegistry {
    subs: RwLock<Arc<Vec<Arc<dyn SubscriptionBoxed>>>>,
    write_lock: Mutex<()>,
    locks: Arc<LockGroupManager>,
}

impl SubscriptionRegistry {
    pub fn new(locks: Arc<LockGroupManager>) -> Self {
        Self {
            subs: RwLock::new(Arc::new(Vec::new())),
            write_lock: Mutex::new(()),
            locks,
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn SubscriptionBoxed>>> {
        self.subs.read().unwrap().clone()
    }

    pub fn find(&self, id: ConsumerId) -> Option<Arc<dyn SubscriptionBoxed>> {
        self.subs
            .read()
            .unwrap()
            .iter()
            .find(|s| s.info().consumer_id == id)
            .cloned()
    }

    /// Inserts `sub`, exclusive consumers at the front so a dispatch walk
    /// naturally tries them first. Updates the shared highest-priority
    /// watermark in the same critical section as the list swap.
    pub fn insert(&self, sub: Arc<dyn SubscriptionBoxed>) {
        let _guard = self.write_lock.lock().unwrap();
        let mut list = (**self.subs.read().unwrap()).clone();
        let info = sub.info();
        if info.exclusive {
            list.insert(0, sub);
        } else {
            list.push(sub);
        }
        self.locks.set_highest_priority(info.priority);
        *self.subs.write().unwrap() = Arc::new(list);
    }

    /// Removes the consumer, recomputing the highest-priority watermark by
    /// a full scan of what remains, since the departing consumer may have
    /// held the current maximum.
    pub fn remove(&self, id: ConsumerId) -> Option<Arc<dyn SubscriptionBoxed>> {
        let _guard = self.write_lock.lock().unwrap();
        let mut list = (**self.subs.read().unwrap()).clone();
        let idx = list.iter().position(|s| s.info().consumer_id == id)?;
        let removed = list.remove(idx);
        let highest = list.iter().map(|s| s.info().priority).max().unwrap_or(i32::MIN);
        self.locks.recompute_highest_priority(highest);
        *self.subs.write().unwrap() = Arc::new(list);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.subs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
