//! Paged-in message handles.
//!
//! A [`MessageReference`] is the cheap, cloneable handle the paged-in set,
//! the dispatch policy, and consumers all pass around once a message has
//! been brought into memory. Unlike a lazily-rehydrated handle, this
//! implementation keeps the message body resident for the reference's
//! lifetime: messages are immutable after `send` (aside from the
//! redelivery counter tracked here), so nothing is gained by re-fetching
//! the body from a store on every access. See `DESIGN.md` for the
//! trade-off this makes against a stricter lazy-body design.

use crate::invariants::{debug_assert_drop_monotonic, debug_assert_ref_count_nonneg};
use crate::lockgroup::ConsumerId;
use crate::message::{Message, MessageId};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct RefInner {
    message: Message,
    ref_count: AtomicU32,
    dropped: AtomicBool,
    lock_owner: Mutex<Option<ConsumerId>>,
    redelivery_count: AtomicU32,
}

/// A cheap, `Clone`-able handle to a paged-in message.
#[derive(Clone)]
pub struct MessageReference(Arc<RefInner>);

impl MessageReference {
    /// Wraps a message that has just been taken off the pending cursor.
    ///
    /// The ref count starts at zero: holding no references is the steady
    /// state for a reference sitting in the paged-in set waiting for
    /// dispatch. Callers bracket transient body access with
    /// [`Self::acquire`]/[`Self::release`].
    pub fn new(message: &Message) -> Self {
        Self(Arc::new(RefInner {
            redelivery_count: AtomicU32::new(message.redelivery_count),
            message: message.clone(),
            ref_count: AtomicU32::new(0),
            dropped: AtomicBool::new(false),
            lock_owner: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> MessageId {
        self.0.message.id
    }

    pub fn group_id(&self) -> Option<&str> {
        self.0.message.group_id.as_deref()
    }

    /// Byte size charged against the usage accountant for this message.
    pub fn size(&self) -> u64 {
        self.0.message.payload.len() as u64
    }

    pub fn is_persistent(&self) -> bool {
        self.0.message.persistent
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.0.message.is_expired(now)
    }

    /// Returns a copy of the message body with the current redelivery
    /// count stamped in.
    pub fn body(&self) -> Message {
        let mut msg = self.0.message.clone();
        msg.redelivery_count = self.0.redelivery_count.load(Ordering::Acquire);
        msg
    }

    pub fn acquire(&self) {
        self.0.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) {
        let prev = self.0.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert_ref_count_nonneg!(prev);
    }

    pub fn ref_count(&self) -> u32 {
        self.0.ref_count.load(Ordering::Acquire)
    }

    /// Transitions the reference to dropped. Returns `true` if this call
    /// performed the transition, `false` if it was already dropped.
    /// Callers use this to ensure cleanup (accounting release, stats,
    /// garbage bookkeeping) runs exactly once per reference.
    pub fn mark_dropped(&self) -> bool {
        let was_dropped = self
            .0
            .dropped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err();
        debug_assert_drop_monotonic!(was_dropped);
        !was_dropped
    }

    pub fn is_dropped(&self) -> bool {
        self.0.dropped.load(Ordering::Acquire)
    }

    pub fn lock_owner(&self) -> Option<ConsumerId> {
        *self.0.lock_owner.lock().unwrap()
    }

    pub(crate) fn set_lock_owner(&self, owner: Option<ConsumerId>) {
        *self.0.lock_owner.lock().unwrap() = owner;
    }

    /// Bumps the redelivery counter, returning the new value. Called when
    /// a consumer disconnects or a group re-binds and the reference has
    /// to be re-offered to a different consumer.
    pub fn bump_redelivery(&self) -> u32 {
        self.0.redelivery_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn redelivery_count(&self) -> u32 {
        self.0.redelivery_count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MessageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReference")
            .field("id", &self.id())
            .field("dropped", &self.is_dropped())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: MessageId) -> Message {
        Message::new(id, "payload")
    }

    #[test]
    fn mark_dropped_is_idempotent() {
        let r = MessageReference::new(&msg(1));
        assert!(r.mark_dropped());
        assert!(!r.mark_dropped());
        assert!(r.is_dropped());
    }

    #[test]
    fn lock_owner_round_trips() {
        let r = MessageReference::new(&msg(1));
        assert_eq!(r.lock_owner(), None);
        r.set_lock_owner(Some(ConsumerId(7)));
        assert_eq!(r.lock_owner(), Some(ConsumerId(7)));
    }

    #[test]
    fn redelivery_count_starts_from_message() {
        let mut m = msg(1);
        m.redelivery_count = 3;
        let r = MessageReference::new(&m);
        assert_eq!(r.redelivery_count(), 3);
        assert_eq!(r.bump_redelivery(), 4);
    }
}
