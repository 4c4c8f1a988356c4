use crate::message::MessageId;
use thiserror::Error;

/// Failures surfaced by [`crate::coordinator::QueueCoordinator`] operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// Producer flow control engaged and the queue is configured to fail
    /// sends rather than block the caller until space frees up.
    #[error("resource exhausted: producer flow control engaged and fail-fast is enabled")]
    ResourceExhausted,

    #[error("no message with id {0} found")]
    NotFound(MessageId),

    /// A range ack resolved to zero or more than one live paged-in reference.
    #[error("range ack did not resolve to exactly one live reference; ack ids individually")]
    BulkAckNotSupported,

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Failures from a [`crate::cursor::PendingCursor`] implementation.
///
/// The distinction between variants matters to callers: a transient failure
/// is worth retrying or logging at `warn`, a fatal one means the message is
/// gone and should be logged at `error`.
#[derive(Debug, Clone, Error)]
pub enum CursorError {
    #[error("transient cursor failure: {0}")]
    Transient(String),

    #[error("fatal cursor failure, message lost to this cursor: {0}")]
    Fatal(String),
}

impl CursorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Failures from a [`crate::store::MessageStore`] implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(String),

    #[error("store record corrupt: {0}")]
    Corrupt(String),

    #[error("store is closed")]
    Closed,
}
