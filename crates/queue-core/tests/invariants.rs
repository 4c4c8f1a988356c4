//! Property tests for the core delivery invariants (exactly-once drain,
//! idempotent ack, drop monotonicity), driven through `QueueCoordinator`'s
//! public facade the same way `scenarios.rs` does. `proptest` strategies
//! replace the fixed inputs there with randomized backlog size, paged-in
//! bound, and prefetch, checking the same invariants from a randomized
//! angle instead of fixed ones.

use proptest::prelude::*;
use queue_core::{
    Ack, ConsumerId, ConsumerInfo, DeliveryContext, DestinationId, Message, MessageReference,
    MemoryCursor, OperationContext, QueueConfig, QueueCoordinator, QueueCoordinatorOptions,
    Subscription, SubscriptionBoxed,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A consumer that immediately acks everything it accepts by recording ids
/// for the test driver to ack back through the coordinator, same shape as
/// `scenarios.rs::TestConsumer` but without selectors or exclusivity, since
/// these properties don't need them.
struct DrainingConsumer {
    info: ConsumerInfo,
    received: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
}

impl DrainingConsumer {
    fn new(prefetch: usize) -> Self {
        Self {
            info: ConsumerInfo {
                consumer_id: ConsumerId(1),
                priority: 0,
                exclusive: false,
                browser: false,
                prefetch,
            },
            received: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        }
    }
}

impl Subscription for DrainingConsumer {
    fn info(&self) -> ConsumerInfo {
        self.info
    }

    fn matches(&self, _reference: &MessageReference, _ctx: &DeliveryContext) -> bool {
        self.in_flight.load(Ordering::SeqCst) < self.info.prefetch
    }

    async fn offer(&self, reference: MessageReference) -> bool {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) >= self.info.prefetch {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        self.received.lock().unwrap().push(reference.id());
        true
    }

    async fn on_added(&self, _queue: &DestinationId) {}
    async fn on_removed(&self, _queue: &DestinationId) {}
}

fn coordinator(base_paged_in: usize) -> QueueCoordinator {
    QueueCoordinator::new(
        DestinationId::queue("props"),
        QueueConfig::new(64 * 1024 * 1024)
            .with_base_paged_in(base_paged_in)
            .with_gc_threshold(0),
        Box::new(MemoryCursor::new()),
        None,
        None,
        None,
        QueueCoordinatorOptions::default(),
    )
}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Round-trip / no-duplication: every non-expired message sent to a
    /// single draining consumer is delivered exactly once, in send order,
    /// regardless of how small the paged-in working set or prefetch is
    /// relative to the backlog size.
    #[test]
    fn single_consumer_drains_every_message_exactly_once_in_order(
        total in 1usize..200,
        base_paged_in in 0usize..20,
        prefetch in 1usize..20,
    ) {
        rt().block_on(async move {
            let q = coordinator(base_paged_in);
            let ctx = OperationContext::none();
            for id in 1..=(total as u64) {
                q.send(&ctx, Message::new(id, "x")).await.unwrap();
            }

            let consumer = Arc::new(DrainingConsumer::new(prefetch));
            q.add_subscription(consumer.clone() as Arc<dyn SubscriptionBoxed>).await.unwrap();

            for _ in 0..(total + 10) {
                let batch: Vec<u64> = {
                    let mut guard = consumer.received.lock().unwrap();
                    std::mem::take(&mut *guard)
                };
                if batch.is_empty() && consumer.in_flight.load(Ordering::SeqCst) == 0 {
                    if q.stats().messages.get() == 0 {
                        break;
                    }
                }
                for id in batch {
                    q.acknowledge(&ctx, Ack::Single(id)).await.unwrap();
                    consumer.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                q.page_in(true).await;
            }

            prop_assert_eq!(q.stats().messages.get(), 0, "every sent message must eventually be acknowledged");
            prop_assert_eq!(q.stats().enqueues.get(), total as i64);
            prop_assert_eq!(q.stats().dequeues.get(), total as i64, "no message may be delivered/dropped more than once");
            Ok(())
        })?;
    }

    /// Idempotent ack: acknowledging an id that was never sent (or was
    /// already acked) is a no-op — it must not error and must not touch the
    /// depth/dequeue gauges.
    #[test]
    fn acknowledging_unknown_id_is_a_no_op(
        unknown_id in 1_000_000u64..2_000_000,
        sent in 0usize..20,
    ) {
        rt().block_on(async move {
            let q = coordinator(100);
            let ctx = OperationContext::none();
            for id in 1..=(sent as u64) {
                q.send(&ctx, Message::new(id, "x")).await.unwrap();
            }
            q.page_in(true).await;

            let dequeues_before = q.stats().dequeues.get();
            let depth_before = q.stats().messages.get();

            q.acknowledge(&ctx, Ack::Single(unknown_id)).await.unwrap();

            prop_assert_eq!(q.stats().dequeues.get(), dequeues_before);
            prop_assert_eq!(q.stats().messages.get(), depth_before);
            Ok(())
        })?;
    }

    /// Drop monotonicity: acking the same id twice only decrements the depth
    /// gauge once — the second ack is a no-op, not a double-drop.
    #[test]
    fn double_ack_of_the_same_id_only_drops_once(id in 1u64..1000) {
        rt().block_on(async move {
            let q = coordinator(100);
            let ctx = OperationContext::none();
            q.send(&ctx, Message::new(id, "x")).await.unwrap();
            q.page_in(true).await;

            q.acknowledge(&ctx, Ack::Single(id)).await.unwrap();
            let dequeues_after_first = q.stats().dequeues.get();
            q.acknowledge(&ctx, Ack::Single(id)).await.unwrap();

            prop_assert_eq!(q.stats().dequeues.get(), dequeues_after_first);
            prop_assert_eq!(q.stats().messages.get(), 0);
            Ok(())
        })?;
    }
}
