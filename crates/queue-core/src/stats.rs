//! Hierarchical enqueue/dequeue/depth/consumer counters.
//!
//! Each counter optionally rolls up into a parent's counter of the same
//! kind, so a destination-group or broker-wide view stays consistent
//! without the queue needing to know who, if anyone, is watching.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub struct Gauge {
    value: AtomicI64,
    parent: Option<Arc<Gauge>>,
}

impl Gauge {
    pub fn new(parent: Option<Arc<Gauge>>) -> Arc<Self> {
        Arc::new(Self {
            value: AtomicI64::new(0),
            parent,
        })
    }

    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
        if let Some(parent) = &self.parent {
            parent.add(delta);
        }
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub struct Stats {
    pub enqueues: Arc<Gauge>,
    pub dequeues: Arc<Gauge>,
    pub messages: Arc<Gauge>,
    pub consumers: Arc<Gauge>,
}

impl Stats {
    pub fn new(parent: Option<Arc<Stats>>) -> Self {
        Self {
            enqueues: Gauge::new(parent.as_ref().map(|p| p.enqueues.clone())),
            dequeues: Gauge::new(parent.as_ref().map(|p| p.dequeues.clone())),
            messages: Gauge::new(parent.as_ref().map(|p| p.messages.clone())),
            consumers: Gauge::new(parent.as_ref().map(|p| p.consumers.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_updates_roll_up_to_parent() {
        let parent = Arc::new(Stats::new(None));
        let child = Stats::new(Some(parent.clone()));
        child.enqueues.add(3);
        child.messages.add(1);
        assert_eq!(child.enqueues.get(), 3);
        assert_eq!(parent.enqueues.get(), 3);
        assert_eq!(parent.messages.get(), 1);
    }
}
