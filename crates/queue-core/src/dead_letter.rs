//! Pluggable handling for messages that exhaust their redelivery budget.

use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterAction {
    /// Drop the message entirely.
    Discard,
    /// Ignore the exhausted budget and redeliver as normal.
    Redeliver,
    /// Leave the reference paged in but stop offering it to consumers.
    Park,
}

pub trait DeadLetterStrategy: Send + Sync {
    fn on_exhausted(&self, msg: &Message) -> DeadLetterAction;
}

/// The default strategy: redelivery limits are opt-in, so by default
/// nothing is ever considered exhausted.
pub struct NullDeadLetterStrategy;

impl DeadLetterStrategy for NullDeadLetterStrategy {
    fn on_exhausted(&self, _msg: &Message) -> DeadLetterAction {
        DeadLetterAction::Redeliver
    }
}
