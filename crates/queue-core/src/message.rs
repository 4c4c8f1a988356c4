//! The wire-independent message model carried through the queue.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Identity of a single message, assigned by the owning queue at `send` time.
pub type MessageId = u64;

/// Identity of the producer-side transaction a send participates in, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

/// Tag distinguishing destination kinds. Only `Queue` is constructible here;
/// topic/pub-sub destinations are out of scope for this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Queue,
}

/// Immutable name plus type tag identifying a single queue instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationId {
    pub name: Arc<str>,
    pub kind: DestinationKind,
}

impl DestinationId {
    /// Creates a queue destination identity.
    pub fn queue(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
        }
    }
}

/// A message as the engine sees it: immutable after send except for the
/// broker-maintained redelivery counter and region back-reference.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    pub persistent: bool,
    pub expires_at: Option<Instant>,
    pub group_id: Option<String>,
    pub redelivery_count: u32,
    pub region_destination: Option<DestinationId>,
    pub producer_tx: Option<TransactionId>,
}

impl Message {
    /// Builds a minimal non-persistent message with no headers or group.
    pub fn new(id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
            headers: HashMap::new(),
            persistent: false,
            expires_at: None,
            group_id: None,
            redelivery_count: 0,
            region_destination: None,
            producer_tx: None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// An acknowledgement as presented to `QueueCoordinator::acknowledge`.
///
/// `Range` is accepted but only convertible to a store-level delete when it
/// resolves to exactly one live paged-in reference; see `QueueError::BulkAckNotSupported`.
#[derive(Debug, Clone, Copy)]
pub enum Ack {
    Single(MessageId),
    Range(MessageId, MessageId),
}
