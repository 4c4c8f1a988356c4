//! The bounded in-memory working set of paged-in references.

use crate::invariants::debug_assert_paged_in_bound;
use crate::reference::MessageReference;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct PagedInSet {
    items: Mutex<Vec<MessageReference>>,
    garbage_size: AtomicUsize,
    gc_threshold: usize,
}

impl PagedInSet {
    pub fn new(gc_threshold: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            garbage_size: AtomicUsize::new(0),
            gc_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, refs: Vec<MessageReference>, max: usize) {
        let mut items = self.items.lock().unwrap();
        items.extend(refs);
        debug_assert_paged_in_bound!(items.len(), max);
    }

    pub fn snapshot(&self) -> Vec<MessageReference> {
        self.items.lock().unwrap().clone()
    }

    /// Marks `reference` dropped and, if this call performed the
    /// transition, runs a garbage collection pass once the accumulated
    /// tombstone count crosses the threshold. Returns whether this call
    /// performed the drop transition.
    pub fn drop_and_maybe_gc(&self, reference: &MessageReference) -> bool {
        if !reference.mark_dropped() {
            return false;
        }
        let garbage = self.garbage_size.fetch_add(1, Ordering::AcqRel) + 1;
        if garbage > self.gc_threshold {
            self.gc();
        }
        true
    }

    /// Same as [`Self::drop_and_maybe_gc`] but never triggers a GC pass,
    /// for bulk administrative drops (purge) that run their own single GC
    /// pass at the end instead of one per dropped reference.
    pub fn drop_no_gc(&self, reference: &MessageReference) -> bool {
        if !reference.mark_dropped() {
            return false;
        }
        self.garbage_size.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn gc(&self) {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|r| !r.is_dropped());
        let removed = before - items.len();
        self.garbage_size.fetch_sub(removed, Ordering::AcqRel);
    }

    pub fn garbage_size(&self) -> usize {
        self.garbage_size.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn gc_removes_only_dropped_entries() {
        let set = PagedInSet::new(1);
        let a = MessageReference::new(&Message::new(1, "a"));
        let b = MessageReference::new(&Message::new(2, "b"));
        set.append(vec![a.clone(), b.clone()], 10);

        set.drop_no_gc(&a);
        assert_eq!(set.len(), 2, "drop_no_gc must not compact immediately");
        set.gc();
        assert_eq!(set.len(), 1);
        assert_eq!(set.garbage_size(), 0);
    }

    #[test]
    fn drop_and_maybe_gc_triggers_past_threshold() {
        let set = PagedInSet::new(1);
        let a = MessageReference::new(&Message::new(1, "a"));
        let b = MessageReference::new(&Message::new(2, "b"));
        let c = MessageReference::new(&Message::new(3, "c"));
        set.append(vec![a.clone(), b.clone(), c.clone()], 10);

        set.drop_and_maybe_gc(&a);
        assert_eq!(set.len(), 3);
        set.drop_and_maybe_gc(&b);
        // garbage_size (2) now exceeds the threshold (1): compacted.
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn double_drop_is_a_no_op() {
        let set = PagedInSet::new(10);
        let a = MessageReference::new(&Message::new(1, "a"));
        set.append(vec![a.clone()], 10);
        assert!(set.drop_and_maybe_gc(&a));
        assert!(!set.drop_and_maybe_gc(&a));
    }
}
