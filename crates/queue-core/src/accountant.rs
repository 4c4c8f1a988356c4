//! Byte-budget flow control, optionally cascading to a parent accountant.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Poll interval backing `wait_for_space`'s notify-based wakeup; the same
/// hybrid event/poll pattern the dispatch valve uses, for the same reason:
/// a lost wakeup must not hang a producer forever.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The broker-facing view of a usage accountant, letting a queue-local
/// accountant cascade reservations up to a shared parent budget (e.g. a
/// destination-group or broker-wide limit) without depending on the
/// concrete parent type.
pub trait UsageManager: Send + Sync {
    fn is_full(&self) -> bool;
    fn is_send_fail_if_no_space(&self) -> bool;
    fn reserve(&self, bytes: u64) -> bool;
    fn release(&self, bytes: u64);
}

pub struct UsageAccountant {
    limit: AtomicU64,
    used: AtomicU64,
    fail_fast: AtomicBool,
    parent: Option<Arc<dyn UsageManager>>,
    space_available: Notify,
}

impl UsageAccountant {
    pub fn new(limit_bytes: u64, fail_fast: bool, parent: Option<Arc<dyn UsageManager>>) -> Self {
        Self {
            limit: AtomicU64::new(limit_bytes),
            used: AtomicU64::new(0),
            fail_fast: AtomicBool::new(fail_fast),
            parent,
            space_available: Notify::new(),
        }
    }

    /// Non-blocking attempt to reserve `bytes`. Only succeeds if both this
    /// accountant and (if present) its parent have room.
    pub fn reserve(&self, bytes: u64) -> bool {
        let limit = self.limit.load(Ordering::Acquire);
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            if current.saturating_add(bytes) > limit {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        if let Some(parent) = &self.parent {
            if !parent.reserve(bytes) {
                self.used.fetch_sub(bytes, Ordering::AcqRel);
                return false;
            }
        }
        true
    }

    /// Blocks until `bytes` can be reserved, then reserves them.
    pub async fn wait_for_space(&self, bytes: u64) {
        loop {
            if self.reserve(bytes) {
                return;
            }
            tokio::select! {
                () = self.space_available.notified() => {}
                () = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }

    pub fn release(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
        self.space_available.notify_waiters();
        if let Some(parent) = &self.parent {
            parent.release(bytes);
        }
    }

    pub fn is_full(&self) -> bool {
        let locally_full = self.used.load(Ordering::Acquire) >= self.limit.load(Ordering::Acquire);
        locally_full || self.parent.as_ref().is_some_and(|p| p.is_full())
    }

    pub fn is_send_fail_if_no_space(&self) -> bool {
        self.fail_fast.load(Ordering::Acquire)
    }

    pub fn set_limit(&self, bytes: u64) {
        self.limit.store(bytes, Ordering::Release);
        self.space_available.notify_waiters();
    }

    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::Release);
    }

    pub fn percent_usage(&self) -> f64 {
        let limit = self.limit.load(Ordering::Acquire);
        if limit == 0 {
            return 100.0;
        }
        (self.used.load(Ordering::Acquire) as f64 / limit as f64) * 100.0
    }
}

impl UsageManager for UsageAccountant {
    fn is_full(&self) -> bool {
        UsageAccountant::is_full(self)
    }
    fn is_send_fail_if_no_space(&self) -> bool {
        UsageAccountant::is_send_fail_if_no_space(self)
    }
    fn reserve(&self, bytes: u64) -> bool {
        UsageAccountant::reserve(self, bytes)
    }
    fn release(&self, bytes: u64) {
        UsageAccountant::release(self, bytes);
    }
}
