//! The pending cursor: the ordered backlog of messages not yet paged in.
//!
//! Every method except `start` is synchronous by contract. Cursor state
//! is protected by its own mutex and must never await I/O while holding
//! it, so a disk-spillable cursor has to materialize whatever it needs
//! eagerly rather than fetch it lazily mid-call.

use crate::error::CursorError;
use crate::message::Message;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

pub trait PendingCursor: Send + Sync {
    fn start(&self) -> Pin<Box<dyn Future<Output = Result<(), CursorError>> + Send + '_>>;

    /// Whether this cursor's contents must be rebuilt from a backing store
    /// before the queue is usable (true right after a crash restart with a
    /// disk-backed cursor, false for an in-memory one).
    fn is_recovery_required(&self) -> bool;

    fn add_message_last(&self, msg: Message) -> Result<(), CursorError>;

    /// Resets the read position to the head of the remaining backlog.
    fn reset(&self);

    fn has_next(&self) -> bool;

    /// Returns the message at the current read position and advances it,
    /// without removing the message from the backlog.
    fn next(&self) -> Option<Message>;

    /// Removes the message last returned by `next` from the backlog.
    fn remove(&self);

    fn size(&self) -> usize;
}

struct MemoryCursorState {
    items: VecDeque<Message>,
    position: usize,
    last_yielded: Option<usize>,
}

/// A volatile, in-memory FIFO cursor. No recovery, no persistence: every
/// message added here is gone on restart.
pub struct MemoryCursor {
    state: Mutex<MemoryCursorState>,
}

impl MemoryCursor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryCursorState {
                items: VecDeque::new(),
                position: 0,
                last_yielded: None,
            }),
        }
    }
}

impl Default for MemoryCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCursor for MemoryCursor {
    fn start(&self) -> Pin<Box<dyn Future<Output = Result<(), CursorError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn is_recovery_required(&self) -> bool {
        false
    }

    fn add_message_last(&self, msg: Message) -> Result<(), CursorError> {
        self.state.lock().unwrap().items.push_back(msg);
        Ok(())
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.position = 0;
        state.last_yielded = None;
    }

    fn has_next(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.position < state.items.len()
    }

    fn next(&self) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        if state.position >= state.items.len() {
            return None;
        }
        let msg = state.items[state.position].clone();
        state.last_yielded = Some(state.position);
        state.position += 1;
        Some(msg)
    }

    fn remove(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(idx) = state.last_yielded.take() {
            state.items.remove(idx);
            if state.position > idx {
                state.position -= 1;
            }
        }
    }

    fn size(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64) -> Message {
        Message::new(id, "x")
    }

    #[test]
    fn drain_loop_yields_fifo_order() {
        let cursor = MemoryCursor::new();
        cursor.add_message_last(msg(1)).unwrap();
        cursor.add_message_last(msg(2)).unwrap();
        cursor.add_message_last(msg(3)).unwrap();

        cursor.reset();
        let mut drained = Vec::new();
        while cursor.has_next() {
            let Some(m) = cursor.next() else { break };
            cursor.remove();
            drained.push(m.id);
        }
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(cursor.size(), 0);
    }

    #[test]
    fn non_destructive_walk_does_not_consume() {
        let cursor = MemoryCursor::new();
        cursor.add_message_last(msg(1)).unwrap();
        cursor.add_message_last(msg(2)).unwrap();

        cursor.reset();
        let mut seen = Vec::new();
        while cursor.has_next() {
            let Some(m) = cursor.next() else { break };
            seen.push(m.id);
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(cursor.size(), 2, "browse-style walk must not remove anything");
    }

    #[test]
    fn partial_drain_then_add_preserves_order() {
        let cursor = MemoryCursor::new();
        cursor.add_message_last(msg(1)).unwrap();
        cursor.add_message_last(msg(2)).unwrap();

        cursor.reset();
        assert_eq!(cursor.next().map(|m| m.id), Some(1));
        cursor.remove();

        cursor.add_message_last(msg(3)).unwrap();

        cursor.reset();
        let mut seen = Vec::new();
        while cursor.has_next() {
            let Some(m) = cursor.next() else { break };
            seen.push(m.id);
        }
        assert_eq!(seen, vec![2, 3]);
    }
}
