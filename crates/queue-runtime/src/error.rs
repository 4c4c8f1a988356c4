use thiserror::Error;

/// Failures constructing or driving a [`crate::TokioTaskRunner`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `TokioTaskRunner::try_new`/`try_with_poll_interval` were called
    /// outside a tokio runtime, so there is nowhere to spawn the polling
    /// task onto.
    #[error("no tokio runtime is running on this thread")]
    NoRuntime,
}
