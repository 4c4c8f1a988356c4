//! Tokio-backed [`TaskRunner`]: drives a registered [`CooperativeTask`]'s
//! `iterate()` on a hybrid wakeup/poll schedule, running it back-to-back
//! while it reports more work and falling back to `poll_interval` whenever
//! a wakeup is lost.

mod error;
mod runner;

pub use error::RuntimeError;
pub use runner::TokioTaskRunner;
