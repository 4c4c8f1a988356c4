use crate::error::RuntimeError;
use queue_core::{CooperativeTaskBoxed, TaskRunner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Safety-net poll interval, same hybrid event/poll pattern as
/// `DispatchValve` and `UsageAccountant` elsewhere in this engine: a lost
/// wakeup stalls for at most this long rather than forever. Overridable via
/// [`TokioTaskRunner::new`]; defaults to `QueueConfig::poll_interval`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Shared {
    task: Mutex<Option<Arc<dyn CooperativeTaskBoxed>>>,
    wake: Notify,
    stopping: AtomicBool,
    stopped: AtomicBool,
    stopped_notify: Notify,
}

/// Drives one registered [`queue_core::CooperativeTask`] on a background
/// tokio task. Must be constructed from within a tokio runtime.
pub struct TokioTaskRunner {
    shared: Arc<Shared>,
}

impl TokioTaskRunner {
    /// Spawns the polling task via `tokio::spawn`, which panics when
    /// called outside a tokio runtime. Use [`Self::try_new`] to get a
    /// `Result` instead.
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self::try_with_poll_interval(poll_interval)
            .expect("TokioTaskRunner::new called outside a tokio runtime; use try_new instead")
    }

    /// Fallible constructor: returns [`RuntimeError::NoRuntime`] instead of
    /// panicking when no tokio runtime is current on this thread.
    pub fn try_new() -> Result<Self, RuntimeError> {
        Self::try_with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn try_with_poll_interval(poll_interval: Duration) -> Result<Self, RuntimeError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?;
        let shared = Arc::new(Shared {
            task: Mutex::new(None),
            wake: Notify::new(),
            stopping: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stopped_notify: Notify::new(),
        });
        handle.spawn(Self::run(shared.clone(), poll_interval));
        Ok(Self { shared })
    }

    async fn run(shared: Arc<Shared>, poll_interval: Duration) {
        loop {
            if shared.stopping.load(Ordering::Acquire) {
                break;
            }
            let task = shared.task.lock().unwrap().clone();
            let more_work = match task {
                Some(task) => task.iterate_boxed().await,
                None => false,
            };
            if more_work {
                continue;
            }
            tokio::select! {
                () = shared.wake.notified() => {}
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
        shared.stopped.store(true, Ordering::Release);
        shared.stopped_notify.notify_waiters();
    }
}

impl Default for TokioTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for TokioTaskRunner {
    fn register(&self, task: Arc<dyn CooperativeTaskBoxed>) {
        *self.shared.task.lock().unwrap() = Some(task);
        self.shared.wake.notify_one();
    }

    fn wakeup(&self) {
        self.shared.wake.notify_one();
    }

    async fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        loop {
            if self.shared.stopped.load(Ordering::Acquire) {
                return;
            }
            tokio::select! {
                () = self.shared.stopped_notify.notified() => {}
                () = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingTask {
        calls: AtomicU32,
        stop_after: u32,
    }

    impl queue_core::CooperativeTask for CountingTask {
        async fn iterate(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
            n < self.stop_after
        }
    }

    #[tokio::test]
    async fn drives_registered_task_until_it_reports_no_more_work() {
        let runner = TokioTaskRunner::with_poll_interval(Duration::from_secs(3600));
        let task = Arc::new(CountingTask { calls: AtomicU32::new(0), stop_after: 5 });
        runner.register(task.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.calls.load(Ordering::Acquire) >= 5);
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn wakeup_runs_an_iteration_without_waiting_for_poll_interval() {
        let runner = TokioTaskRunner::with_poll_interval(Duration::from_secs(3600));
        let task = Arc::new(CountingTask { calls: AtomicU32::new(0), stop_after: 1 });
        runner.register(task.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = task.calls.load(Ordering::Acquire);
        runner.wakeup();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(task.calls.load(Ordering::Acquire) >= before);
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_completes_even_with_no_task_registered() {
        let runner = TokioTaskRunner::new();
        runner.shutdown().await;
    }

    #[test]
    fn try_new_reports_no_runtime_outside_tokio() {
        assert!(matches!(TokioTaskRunner::try_new(), Err(RuntimeError::NoRuntime)));
    }
}
