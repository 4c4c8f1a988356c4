//! The persistence boundary: a queue's view of durable storage.
//!
//! `MessageStore` follows the same dual-trait shape as [`crate::subscription::Subscription`]:
//! implement the ergonomic native-`async fn` trait, get the object-safe
//! sibling for free via the blanket impl.

use crate::error::StoreError;
use crate::message::{Message, MessageId};
use crate::accountant::UsageManager;
use crate::txn::OperationContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Identifies the message to delete for a single, resolved acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleAck(pub MessageId);

/// Callback a store drives once per message during [`MessageStore::recover`].
///
/// Synchronous by design: recovery rebuilds the pending cursor in memory,
/// which per this crate's concurrency rules never awaits I/O.
pub trait RecoveryListener: Send {
    fn on_recovered(&mut self, msg: Message);
}

pub trait MessageStore: Send + Sync {
    fn add_message(
        &self,
        ctx: &OperationContext,
        msg: &Message,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_message(
        &self,
        ctx: &OperationContext,
        ack: SingleAck,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_all_messages(&self, ctx: &OperationContext) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_message(&self, id: MessageId) -> impl Future<Output = Result<Option<Message>, StoreError>> + Send;

    fn recover(
        &self,
        listener: &mut dyn RecoveryListener,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Wires the store's own byte accounting (if any) to the queue's
    /// usage accountant, so store-side buffering counts against the same
    /// budget producers block on.
    fn set_usage_manager(&self, usage: Arc<dyn UsageManager>);
}

pub trait MessageStoreBoxed: Send + Sync {
    fn add_message_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
        msg: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn remove_message_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
        ack: SingleAck,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn remove_all_messages_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn get_message_boxed(&self, id: MessageId) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + '_>>;

    fn recover_boxed<'a>(
        &'a self,
        listener: &'a mut dyn RecoveryListener,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn set_usage_manager(&self, usage: Arc<dyn UsageManager>);
}

impl<T: MessageStore> MessageStoreBoxed for T {
    fn add_message_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
        msg: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.add_message(ctx, msg))
    }

    fn remove_message_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
        ack: SingleAck,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.remove_message(ctx, ack))
    }

    fn remove_all_messages_boxed<'a>(
        &'a self,
        ctx: &'a OperationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.remove_all_messages(ctx))
    }

    fn get_message_boxed(&self, id: MessageId) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + '_>> {
        Box::pin(self.get_message(id))
    }

    fn recover_boxed<'a>(
        &'a self,
        listener: &'a mut dyn RecoveryListener,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.recover(listener))
    }

    fn set_usage_manager(&self, usage: Arc<dyn UsageManager>) {
        MessageStore::set_usage_manager(self, usage);
    }
}
