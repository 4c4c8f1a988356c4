//! The consumer-facing interface a queue dispatches references through.
//!
//! Defined as a pair of traits following the same shape used elsewhere in
//! this codebase for async capability interfaces: [`Subscription`] is the
//! ergonomic one to implement (native `async fn`), [`SubscriptionBoxed`] is
//! the object-safe one the registry actually stores as `Arc<dyn ...>`. A
//! blanket impl bridges every `Subscription` into a `SubscriptionBoxed`
//! automatically, so implementors never touch the boxed half.

use crate::lockgroup::ConsumerId;
use crate::message::DestinationId;
use crate::reference::MessageReference;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

/// Static properties of a consumer, read by the registry and dispatch
/// policy; these never change for the lifetime of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub consumer_id: ConsumerId,
    pub priority: i32,
    pub exclusive: bool,
    /// A browser receives copies without consuming; it is excluded from
    /// redelivery bookkeeping when it disconnects.
    pub browser: bool,
    pub prefetch: usize,
}

/// Context handed to [`Subscription::matches`] for selector/filter evaluation.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub now: Instant,
    pub queue: DestinationId,
}

/// A single competing consumer attached to a queue.
///
/// `offer` treats the reference as an opaque sink: whether it gets queued
/// for local prefetch, dispatched over a network session, or dropped on
/// disconnect is entirely up to the implementation. The engine only needs
/// the accept/reject bool back.
pub trait Subscription: Send + Sync {
    fn info(&self) -> ConsumerInfo;

    fn matches(&self, reference: &MessageReference, ctx: &DeliveryContext) -> bool;

    fn offer(&self, reference: MessageReference) -> impl Future<Output = bool> + Send;

    fn on_added(&self, queue: &DestinationId) -> impl Future<Output = ()> + Send;

    fn on_removed(&self, queue: &DestinationId) -> impl Future<Output = ()> + Send;
}

/// Object-safe sibling of [`Subscription`], implemented automatically for
/// every `Subscription`.
pub trait SubscriptionBoxed: Send + Sync {
    fn info(&self) -> ConsumerInfo;

    fn matches(&self, reference: &MessageReference, ctx: &DeliveryContext) -> bool;

    fn offer_boxed(&self, reference: MessageReference) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    fn on_added_boxed<'a>(&'a self, queue: &'a DestinationId) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    fn on_removed_boxed<'a>(&'a self, queue: &'a DestinationId) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

impl<T: Subscription> SubscriptionBoxed for T {
    fn info(&self) -> ConsumerInfo {
        Subscription::info(self)
    }

    fn matches(&self, reference: &MessageReference, ctx: &DeliveryContext) -> bool {
        Subscription::matches(self, reference, ctx)
    }

    fn offer_boxed(&self, reference: MessageReference) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(self.offer(reference))
    }

    fn on_added_boxed<'a>(&'a self, queue: &'a DestinationId) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.on_added(queue))
    }

    fn on_removed_boxed<'a>(&'a self, queue: &'a DestinationId) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.on_removed(queue))
    }
}
