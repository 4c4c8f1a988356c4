//! Tunables for a single queue instance.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Paged-in depth kept resident with no consumers attached; grows by
    /// each consumer's prefetch while they're subscribed.
    pub base_paged_in: usize,
    /// Tombstone count in the paged-in set that triggers an eager GC pass.
    pub gc_threshold: usize,
    pub usage_limit_bytes: u64,
    /// When the usage budget is full: `true` fails sends immediately,
    /// `false` blocks the producer until space frees up.
    pub fail_fast_on_full: bool,
    /// `None` means unlimited redeliveries; dead-letter handling never
    /// triggers.
    pub max_redeliveries: Option<u32>,
    /// Safety-net interval for the iterate loop when nothing wakes it
    /// explicitly; see `queue-runtime`.
    pub poll_interval: Duration,
}

impl QueueConfig {
    pub const fn new(usage_limit_bytes: u64) -> Self {
        Self {
            base_paged_in: 1000,
            gc_threshold: 256,
            usage_limit_bytes,
            fail_fast_on_full: false,
            max_redeliveries: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub const fn with_base_paged_in(mut self, n: usize) -> Self {
        self.base_paged_in = n;
        self
    }

    pub const fn with_gc_threshold(mut self, n: usize) -> Self {
        self.gc_threshold = n;
        self
    }

    pub const fn with_fail_fast_on_full(mut self, fail_fast: bool) -> Self {
        self.fail_fast_on_full = fail_fast;
        self
    }

    pub const fn with_max_redeliveries(mut self, n: u32) -> Self {
        self.max_redeliveries = Some(n);
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let cfg = QueueConfig::new(1024).with_base_paged_in(10).with_max_redeliveries(5);
        assert_eq!(cfg.base_paged_in, 10);
        assert_eq!(cfg.max_redeliveries, Some(5));
        assert_eq!(cfg.usage_limit_bytes, 1024);
    }
}
