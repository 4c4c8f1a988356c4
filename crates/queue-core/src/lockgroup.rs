//! Queue-wide exclusive consumer lock and message-group sticky affinity.
//!
//! Both concerns share one mutex because granting the exclusive lock and
//! granting a per-reference lock are the same decision point: see
//! [`LockGroupManager::try_lock`].

use crate::invariants::debug_assert_single_exclusive_owner;
use crate::reference::MessageReference;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Opaque identity of a consumer, scoped to one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub u64);

/// The capabilities of a lock-requesting actor: a real consumer, or the
/// administrative pseudo-owner used by purge/removeMatching/moveMatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOwner {
    pub id: ConsumerId,
    pub priority: i32,
    pub exclusive: bool,
}

/// Administrative operations (purge, removeMatching, moveMatching) act as a
/// lock owner that always outranks real consumers and never contends for
/// the exclusive gate.
pub const ADMIN_OWNER: LockOwner = LockOwner {
    id: ConsumerId(u64::MAX),
    priority: i32::MAX,
    exclusive: false,
};

struct LockState {
    exclusive_owner: Option<LockOwner>,
    highest_priority: i32,
}

/// Owns the queue-wide exclusive lock and the message-group-id to
/// consumer-id sticky map.
pub struct LockGroupManager {
    state: Mutex<LockState>,
    groups: Mutex<HashMap<String, ConsumerId>>,
}

impl LockGroupManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                exclusive_owner: None,
                highest_priority: i32::MIN,
            }),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to grant `owner` the per-reference lock on `reference`,
    /// folding in the queue-wide exclusive gate:
    ///
    /// 1. If `reference` is already locked by `owner`, re-grant (idempotent).
    /// 2. If `reference` is locked by someone else, deny.
    /// 3. If an exclusive owner exists and it isn't `owner`, deny.
    /// 4. If `owner.priority` is below the queue's `highest_priority`, deny.
    /// 5. If `owner.exclusive`, it becomes the queue's exclusive owner.
    /// 6. Otherwise grant without becoming the exclusive owner.
    pub fn try_lock(&self, reference: &MessageReference, owner: LockOwner) -> bool {
        let mut state = self.state.lock().unwrap();

        match reference.lock_owner() {
            Some(current) if current == owner.id => return true,
            Some(_) => return false,
            None => {}
        }

        if let Some(exclusive) = state.exclusive_owner {
            if exclusive.id != owner.id {
                return false;
            }
        }

        if owner.priority < state.highest_priority {
            return false;
        }

        if owner.exclusive {
            debug_assert_single_exclusive_owner!(state.exclusive_owner, owner);
            state.exclusive_owner = Some(owner);
        }

        reference.set_lock_owner(Some(owner.id));
        true
    }

    /// Releases the per-reference lock. Does not touch the queue-wide
    /// exclusive owner; that is cleared only by [`Self::clear_exclusive_if`].
    pub fn unlock(&self, reference: &MessageReference) {
        reference.set_lock_owner(None);
    }

    pub fn set_highest_priority(&self, priority: i32) {
        let mut state = self.state.lock().unwrap();
        if priority > state.highest_priority {
            state.highest_priority = priority;
        }
    }

    /// Full recompute, used by the subscription registry after a removal
    /// since the departing consumer may have held the current maximum.
    pub fn recompute_highest_priority(&self, priority: i32) {
        self.state.lock().unwrap().highest_priority = priority;
    }

    pub fn highest_priority(&self) -> i32 {
        self.state.lock().unwrap().highest_priority
    }

    /// Clears the exclusive owner if it is `id`. Returns whether it was.
    pub fn clear_exclusive_if(&self, id: ConsumerId) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.exclusive_owner.map(|o| o.id) == Some(id) {
            state.exclusive_owner = None;
            true
        } else {
            false
        }
    }

    pub fn exclusive_owner(&self) -> Option<LockOwner> {
        self.state.lock().unwrap().exclusive_owner
    }

    /// Binds `group_id` to `consumer` if unbound, returning whichever
    /// consumer ends up owning the group (the caller's, or an earlier one).
    pub fn bind_group(&self, group_id: &str, consumer: ConsumerId) -> ConsumerId {
        *self
            .groups
            .lock()
            .unwrap()
            .entry(group_id.to_string())
            .or_insert(consumer)
    }

    pub fn group_owner(&self, group_id: &str) -> Option<ConsumerId> {
        self.groups.lock().unwrap().get(group_id).copied()
    }

    /// Removes every group bound to `consumer`, returning their ids so the
    /// caller can redeliver the in-flight messages of those groups.
    pub fn remove_consumer_groups(&self, consumer: ConsumerId) -> HashSet<String> {
        let mut groups = self.groups.lock().unwrap();
        let orphaned: HashSet<String> = groups
            .iter()
            .filter(|(_, &v)| v == consumer)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &orphaned {
            groups.remove(key);
        }
        orphaned
    }
}

impl Default for LockGroupManager {
    fn default() -> Self {
        Self::new()
    }
}
