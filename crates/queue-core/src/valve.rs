//! The dispatch valve: a counting gate that quiesces in-flight page-in /
//! dispatch work during topology changes (addSubscription, removeSubscription).
//!
//! Deliberately not part of the five-mutex acquisition order. It is a
//! barrier, not a lock, and the only thing callers ever `.await` while it
//! is closed is the valve itself draining.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Safety-net poll interval backing the notify-based wakeup, mirroring the
/// hybrid event/poll pattern used for backpressure elsewhere in this
/// codebase: a lost wakeup stalls for at most this long instead of forever.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct DispatchValve {
    open: AtomicBool,
    in_flight: AtomicI64,
    quiesced: Notify,
}

impl DispatchValve {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            in_flight: AtomicI64::new(0),
            quiesced: Notify::new(),
        }
    }

    /// Registers one unit of in-flight dispatch work. Returns `false` if
    /// the valve is closed; callers must not proceed with the work in
    /// that case.
    pub fn increment(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if !self.open.load(Ordering::Acquire) {
            // Closed concurrently with our increment; back out so the
            // closer's drain loop doesn't wait on work we never started.
            if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.quiesced.notify_waiters();
            }
            return false;
        }
        true
    }

    pub fn decrement(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 && !self.open.load(Ordering::Acquire) {
            self.quiesced.notify_waiters();
        }
    }

    /// Closes the valve and waits for every unit of in-flight work
    /// registered before the close to call [`Self::decrement`].
    pub async fn turn_off(&self) {
        self.open.store(false, Ordering::Release);
        loop {
            if self.in_flight.load(Ordering::Acquire) <= 0 {
                break;
            }
            tokio::select! {
                () = self.quiesced.notified() => {}
                () = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {}
            }
        }
    }

    pub fn turn_on(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Default for DispatchValve {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc as LoomArc;

    // Exercises the increment/decrement race against a concurrent turn_off
    // in isolation, independent of tokio's scheduler. Mirrors this
    // codebase's practice of loom-testing one narrow synchronization
    // primitive at a time rather than the whole engine.
    #[test]
    fn concurrent_increment_and_close_never_double_notify() {
        loom::model(|| {
            let open = LoomArc::new(loom::sync::atomic::AtomicBool::new(true));
            let in_flight = LoomArc::new(loom::sync::atomic::AtomicI64::new(0));

            let o1 = open.clone();
            let f1 = in_flight.clone();
            let t1 = loom::thread::spawn(move || {
                if o1.load(loom::sync::atomic::Ordering::Acquire) {
                    f1.fetch_add(1, loom::sync::atomic::Ordering::AcqRel);
                    f1.fetch_sub(1, loom::sync::atomic::Ordering::AcqRel);
                }
            });

            open.store(false, loom::sync::atomic::Ordering::Release);
            t1.join().unwrap();

            assert_eq!(in_flight.load(loom::sync::atomic::Ordering::Acquire), 0);
        });
    }
}
