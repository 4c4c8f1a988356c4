//! On-disk record shapes for [`crate::wal::WalStore`].
//!
//! Kept distinct from [`queue_core::Message`] on purpose: the engine's
//! domain type carries a monotonic [`std::time::Instant`] for expiry and an
//! `Arc<str>` destination name, neither of which survives a process
//! restart. The WAL format freezes expiry as milliseconds since the Unix
//! epoch and the destination as a plain `String`, and the store translates
//! between the two at the boundary.

use queue_core::{DestinationId, Message, MessageId, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WalMessage {
    pub id: MessageId,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub persistent: bool,
    pub expires_at_epoch_millis: Option<u64>,
    pub group_id: Option<String>,
    pub redelivery_count: u32,
    pub region_destination_name: Option<String>,
    pub producer_tx: Option<u64>,
}

impl WalMessage {
    pub fn from_message(msg: &Message) -> Self {
        let expires_at_epoch_millis = msg.expires_at.map(|at| instant_to_epoch_millis(at));
        Self {
            id: msg.id,
            payload: msg.payload.to_vec(),
            headers: msg.headers.clone(),
            persistent: msg.persistent,
            expires_at_epoch_millis,
            group_id: msg.group_id.clone(),
            redelivery_count: msg.redelivery_count,
            region_destination_name: msg.region_destination.as_ref().map(|d| d.name.to_string()),
            producer_tx: msg.producer_tx.map(|t| t.0),
        }
    }

    pub fn into_message(self) -> Message {
        let expires_at = self.expires_at_epoch_millis.map(epoch_millis_to_instant);
        Message {
            id: self.id,
            payload: self.payload.into(),
            headers: self.headers,
            persistent: self.persistent,
            expires_at,
            group_id: self.group_id,
            redelivery_count: self.redelivery_count,
            region_destination: self.region_destination_name.map(DestinationId::queue),
            producer_tx: self.producer_tx.map(TransactionId),
        }
    }
}

/// Best-effort conversion; an expiry already in the past collapses to
/// `UNIX_EPOCH`, which still compares as expired everywhere it's read.
fn instant_to_epoch_millis(at: Instant) -> u64 {
    let now_instant = Instant::now();
    let now_wall = SystemTime::now();
    let wall = if at >= now_instant {
        now_wall + (at - now_instant)
    } else {
        now_wall - (now_instant - at)
    };
    wall.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn epoch_millis_to_instant(epoch_millis: u64) -> Instant {
    let target = UNIX_EPOCH + std::time::Duration::from_millis(epoch_millis);
    let now_wall = SystemTime::now();
    let now_instant = Instant::now();
    match target.duration_since(now_wall) {
        Ok(remaining) => now_instant + remaining,
        Err(elapsed) => now_instant
            .checked_sub(elapsed.duration())
            .unwrap_or(now_instant),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum WalRecord {
    Insert(WalMessage),
    Tombstone(MessageId),
    Clear,
}
