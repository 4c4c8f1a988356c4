//! Pure dispatch function: which consumer, if any, gets offered a reference.

use crate::lockgroup::{ConsumerId, LockGroupManager, LockOwner};
use crate::message::DestinationId;
use crate::reference::MessageReference;
use crate::subscription::{DeliveryContext, SubscriptionBoxed};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Takes an owned snapshot of everything it needs so the returned future
/// is `'static` and has no borrows to juggle across `.await` points.
pub trait DispatchPolicy: Send + Sync {
    fn dispatch(
        &self,
        reference: MessageReference,
        queue: DestinationId,
        consumers: Vec<Arc<dyn SubscriptionBoxed>>,
        locks: Arc<LockGroupManager>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send>>;
}

/// Round-robins over the consumer snapshot in order, honoring group
/// affinity and the queue-wide exclusive/priority gate via `locks`.
pub struct RoundRobinPolicy;

impl DispatchPolicy for RoundRobinPolicy {
    fn dispatch(
        &self,
        reference: MessageReference,
        queue: DestinationId,
        consumers: Vec<Arc<dyn SubscriptionBoxed>>,
        locks: Arc<LockGroupManager>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send>> {
        Box::pin(async move {
            let bound_to: Option<ConsumerId> = reference.group_id().and_then(|g| locks.group_owner(g));
            let ctx = DeliveryContext {
                now: Instant::now(),
                queue,
            };

            for sub in &consumers {
                let info = sub.info();
                if let Some(bound) = bound_to {
                    if info.consumer_id != bound {
                        continue;
                    }
                }
                if !sub.matches(&reference, &ctx) {
                    continue;
                }
                let owner = LockOwner {
                    id: info.consumer_id,
                    priority: info.priority,
                    exclusive: info.exclusive,
                };
                if !locks.try_lock(&reference, owner) {
                    continue;
                }
                if sub.offer_boxed(reference.clone()).await {
                    if let Some(group) = reference.group_id() {
                        locks.bind_group(group, info.consumer_id);
                    }
                    return true;
                }
                locks.unlock(&reference);
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::subscription::{ConsumerInfo, Subscription};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Accepting {
        info: ConsumerInfo,
        accepted: AtomicBool,
    }
    impl Subscription for Accepting {
        fn info(&self) -> ConsumerInfo {
            self.info
        }
        fn matches(&self, _r: &MessageReference, _ctx: &DeliveryContext) -> bool {
            true
        }
        async fn offer(&self, _reference: MessageReference) -> bool {
            self.accepted.store(true, Ordering::SeqCst);
            true
        }
        async fn on_added(&self, _queue: &DestinationId) {}
        async fn on_removed(&self, _queue: &DestinationId) {}
    }

    fn info(id: u64) -> ConsumerInfo {
        ConsumerInfo {
            consumer_id: ConsumerId(id),
            priority: 0,
            exclusive: false,
            browser: false,
            prefetch: 10,
        }
    }

    #[tokio::test]
    async fn first_matching_consumer_wins() {
        let locks = Arc::new(LockGroupManager::new());
        let a = Arc::new(Accepting {
            info: info(1),
            accepted: AtomicBool::new(false),
        });
        let reference = MessageReference::new(&Message::new(1, "x"));
        let dispatched = RoundRobinPolicy
            .dispatch(
                reference,
                DestinationId::queue("q"),
                vec![a.clone()],
                locks,
            )
            .await;
        assert!(dispatched);
        assert!(a.accepted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn group_bound_reference_only_offered_to_owner() {
        let locks = Arc::new(LockGroupManager::new());
        locks.bind_group("g1", ConsumerId(2));
        let a = Arc::new(Accepting {
            info: info(1),
            accepted: AtomicBool::new(false),
        });
        let mut msg = Message::new(1, "x");
        msg.group_id = Some("g1".to_string());
        let reference = MessageReference::new(&msg);

        let dispatched = RoundRobinPolicy
            .dispatch(reference, DestinationId::queue("q"), vec![a.clone()], locks)
            .await;
        assert!(!dispatched, "consumer 1 does not own group g1");
        assert!(!a.accepted.load(Ordering::SeqCst));
    }
}
