//! The cooperative-scheduling boundary a queue registers its iterate loop with.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A unit of cooperative work: one paging/dispatch pass. Returns whether
/// there is likely more work to do immediately, as a scheduling hint.
pub trait CooperativeTask: Send + Sync {
    fn iterate(&self) -> impl Future<Output = bool> + Send;
}

pub trait CooperativeTaskBoxed: Send + Sync {
    fn iterate_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

impl<T: CooperativeTask> CooperativeTaskBoxed for T {
    fn iterate_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(self.iterate())
    }
}

/// Drives a registered [`CooperativeTask`] on whatever schedule the
/// implementation chooses (a hybrid wakeup/poll loop, in the tokio-backed
/// implementation this crate's sibling `queue-runtime` crate provides).
pub trait TaskRunner: Send + Sync {
    fn register(&self, task: Arc<dyn CooperativeTaskBoxed>);

    /// Nudges the runner to run an iteration soon, without waiting for its
    /// regular poll interval.
    fn wakeup(&self);

    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}

pub trait TaskRunnerBoxed: Send + Sync {
    fn register(&self, task: Arc<dyn CooperativeTaskBoxed>);
    fn wakeup(&self);
    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<T: TaskRunner> TaskRunnerBoxed for T {
    fn register(&self, task: Arc<dyn CooperativeTaskBoxed>) {
        TaskRunner::register(self, task);
    }
    fn wakeup(&self) {
        TaskRunner::wakeup(self);
    }
    fn shutdown_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.shutdown())
    }
}
