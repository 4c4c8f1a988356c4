//! The queue façade: every public operation a broker-facing layer calls.
//!
//! Internally this is an `Arc`-wrapped handle, cloned freely the same way
//! a channel handle is cloned elsewhere in this codebase: cloning shares
//! state, it does not create a second queue.
//!
//! Mutex acquisition order, enforced by construction rather than by a
//! lint: `dispatch_mutex` -> (`cursor`'s own lock | `paged_in`'s own lock)
//! -> `registry`'s own lock -> `locks` (exclusive/group). The dispatch
//! valve is a barrier, not part of this order; it is the only thing a
//! caller awaits while holding no mutex at all.

use crate::accountant::{UsageAccountant, UsageManager};
use crate::config::QueueConfig;
use crate::cursor::PendingCursor;
use crate::dead_letter::{DeadLetterAction, DeadLetterStrategy, NullDeadLetterStrategy};
use crate::error::QueueError;
use crate::lockgroup::{ConsumerId, LockGroupManager, LockOwner, ADMIN_OWNER};
use crate::message::{Ack, DestinationId, Message, MessageId};
use crate::paged_in::PagedInSet;
use crate::policy::{DispatchPolicy, RoundRobinPolicy};
use crate::reference::MessageReference;
use crate::registry::SubscriptionRegistry;
use crate::stats::Stats;
use crate::store::{MessageStoreBoxed, RecoveryListener, SingleAck};
use crate::subscription::SubscriptionBoxed;
use crate::task::{CooperativeTask, TaskRunnerBoxed};
use crate::txn::OperationContext;
use crate::valve::DispatchValve;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

/// Collaborators a caller can override when constructing a queue; every
/// field has a sensible default via [`Default`].
pub struct QueueCoordinatorOptions {
    pub dead_letter: Arc<dyn DeadLetterStrategy>,
    pub policy: Box<dyn DispatchPolicy>,
}

impl Default for QueueCoordinatorOptions {
    fn default() -> Self {
        Self {
            dead_letter: Arc::new(NullDeadLetterStrategy),
            policy: Box::new(RoundRobinPolicy),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStats {
    pub recovered: usize,
}

struct Inner {
    destination: DestinationId,
    config: QueueConfig,
    cursor: Box<dyn PendingCursor>,
    paged_in: PagedInSet,
    registry: SubscriptionRegistry,
    locks: Arc<LockGroupManager>,
    policy: Box<dyn DispatchPolicy>,
    accountant: Arc<UsageAccountant>,
    store: Option<Arc<dyn MessageStoreBoxed>>,
    dead_letter: Arc<dyn DeadLetterStrategy>,
    stats: Stats,
    valve: DispatchValve,
    dispatch_mutex: AsyncMutex<()>,
    max_paged_in: AtomicUsize,
    next_id: AtomicU64,
    task_runner: StdMutex<Option<Arc<dyn TaskRunnerBoxed>>>,
}

pub struct QueueCoordinator {
    inner: Arc<Inner>,
}

impl Clone for QueueCoordinator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl QueueCoordinator {
    pub fn new(
        destination: DestinationId,
        config: QueueConfig,
        cursor: Box<dyn PendingCursor>,
        store: Option<Arc<dyn MessageStoreBoxed>>,
        parent_usage: Option<Arc<dyn UsageManager>>,
        stats_parent: Option<Arc<Stats>>,
        options: QueueCoordinatorOptions,
    ) -> Self {
        let accountant = Arc::new(UsageAccountant::new(
            config.usage_limit_bytes,
            config.fail_fast_on_full,
            parent_usage,
        ));
        if let Some(store) = &store {
            store.set_usage_manager(accountant.clone() as Arc<dyn UsageManager>);
        }
        let locks = Arc::new(LockGroupManager::new());
        let gc_threshold = config.gc_threshold;
        let base_paged_in = config.base_paged_in;

        let inner = Inner {
            destination,
            registry: SubscriptionRegistry::new(locks.clone()),
            locks,
            config,
            cursor,
            paged_in: PagedInSet::new(gc_threshold),
            policy: options.policy,
            accountant,
            store,
            dead_letter: options.dead_letter,
            stats: Stats::new(stats_parent),
            valve: DispatchValve::new(),
            dispatch_mutex: AsyncMutex::new(()),
            max_paged_in: AtomicUsize::new(base_paged_in),
            next_id: AtomicU64::new(1),
            task_runner: StdMutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn destination(&self) -> &DestinationId {
        &self.inner.destination
    }

    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    /// Allocates the next message id for this queue. Exposed so
    /// `copyMatching`/`moveMatching` can mint a fresh id when resending to
    /// a different destination.
    pub fn next_message_id(&self) -> MessageId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn set_task_runner(&self, runner: Arc<dyn TaskRunnerBoxed>) {
        let task: Arc<dyn crate::task::CooperativeTaskBoxed> = Arc::new(self.clone());
        runner.register(task);
        *self.inner.task_runner.lock().unwrap() = Some(runner);
    }

    pub async fn start(&self) -> Result<(), QueueError> {
        self.inner.cursor.start().await?;
        if self.inner.cursor.is_recovery_required() {
            self.recover().await?;
        }
        Ok(())
    }

    pub async fn recover(&self) -> Result<RecoveryStats, QueueError> {
        let Some(store) = &self.inner.store else {
            return Ok(RecoveryStats::default());
        };

        struct CursorListener<'a> {
            cursor: &'a dyn PendingCursor,
            count: usize,
        }
        impl RecoveryListener for CursorListener<'_> {
            fn on_recovered(&mut self, msg: Message) {
                if self.cursor.add_message_last(msg).is_ok() {
                    self.count += 1;
                }
            }
        }

        let mut listener = CursorListener {
            cursor: self.inner.cursor.as_ref(),
            count: 0,
        };
        store
            .recover_boxed(&mut listener)
            .await
            .map_err(|e| QueueError::StoreFailure(e.to_string()))?;

        let recovered = listener.count;
        self.inner.stats.messages.add(recovered as i64);
        self.inner.stats.enqueues.add(recovered as i64);
        Ok(RecoveryStats { recovered })
    }

    /// Accepts a message for delivery. Discards it immediately if already
    /// expired; otherwise reserves usage budget (blocking or failing fast
    /// per configuration), persists it if durable, then either appends it
    /// to the pending backlog directly or, inside a transaction, defers
    /// that append to a post-commit callback.
    pub async fn send(&self, ctx: &OperationContext, mut msg: Message) -> Result<(), QueueError> {
        let now = Instant::now();
        if msg.is_expired(now) {
            tracing::debug!(message_id = msg.id, "discarding expired message on send");
            return Ok(());
        }

        let payload_len = msg.payload.len() as u64;
        if self.inner.accountant.is_full() {
            if self.inner.accountant.is_send_fail_if_no_space() {
                return Err(QueueError::ResourceExhausted);
            }
            self.inner.accountant.wait_for_space(payload_len).await;
        } else if !self.inner.accountant.reserve(payload_len) {
            self.inner.accountant.wait_for_space(payload_len).await;
        }

        if msg.is_expired(Instant::now()) {
            self.inner.accountant.release(payload_len);
            return Ok(());
        }

        msg.region_destination = Some(self.inner.destination.clone());

        if msg.persistent {
            if let Some(store) = &self.inner.store {
                if let Err(e) = store.add_message_boxed(ctx, &msg).await {
                    self.inner.accountant.release(payload_len);
                    return Err(QueueError::StoreFailure(e.to_string()));
                }
            }
        }

        if let Some(tx) = ctx.transaction.clone() {
            let this = self.clone();
            let commit_msg = msg.clone();
            tx.register_post_commit(Box::new(move || {
                tokio::spawn(async move {
                    if commit_msg.is_expired(Instant::now()) {
                        this.inner.accountant.release(payload_len);
                        return;
                    }
                    this.append_and_page_in(commit_msg).await;
                });
            }));
            let rollback_accountant = self.inner.accountant.clone();
            tx.register_rollback(Box::new(move || {
                rollback_accountant.release(payload_len);
            }));
            return Ok(());
        }

        self.append_and_page_in(msg).await;
        Ok(())
    }

    async fn append_and_page_in(&self, msg: Message) {
        let size = msg.payload.len() as u64;
        match self.inner.cursor.add_message_last(msg) {
            Ok(()) => {
                self.inner.stats.enqueues.add(1);
                self.inner.stats.messages.add(1);
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "message lost: fatal cursor append failure");
                } else {
                    tracing::warn!(error = %e, "transient cursor append failure, message dropped");
                }
                self.inner.accountant.release(size);
                return;
            }
        }
        self.page_in(false).await;
    }

    /// Brings up to `max_paged_in - current` messages from the pending
    /// cursor into the paged-in set, retries any already-resident
    /// reference still waiting on a consumer, and dispatches the newly
    /// paged-in batch. Gated by the dispatch valve: returns 0 immediately
    /// if the valve is closed for a topology change.
    pub async fn page_in(&self, force: bool) -> usize {
        if !self.inner.valve.increment() {
            return 0;
        }
        let n = self.page_in_and_dispatch(force).await;
        self.inner.valve.decrement();
        n
    }

    /// Core of `page_in`, without the valve gate. Only safe to call while
    /// the caller itself holds the valve closed (`addSubscription`) or via
    /// the gated `page_in` wrapper.
    ///
    /// Retries every already-resident, still-unlocked reference before
    /// paging in anything new: a reference that matched no consumer on its
    /// first offer (prefetch exhausted, selector, group affinity)
    /// otherwise sits in Paged-In forever, since it belongs to no future
    /// page-in batch. This is the later retry that reference needs.
    async fn page_in_and_dispatch(&self, force: bool) -> usize {
        let _guard = self.inner.dispatch_mutex.lock().await;
        let stuck = self.undispatched_residents();
        self.dispatch_refs(stuck).await;
        let batch = self.do_page_in(force);
        let n = batch.len();
        self.dispatch_refs(batch).await;
        n
    }

    fn undispatched_residents(&self) -> Vec<MessageReference> {
        self.inner
            .paged_in
            .snapshot()
            .into_iter()
            .filter(|r| !r.is_dropped() && r.lock_owner().is_none())
            .collect()
    }

    fn do_page_in(&self, force: bool) -> Vec<MessageReference> {
        let max = self.inner.max_paged_in.load(Ordering::SeqCst);
        let current = self.inner.paged_in.len();
        let room = max.saturating_sub(current);
        if room == 0 {
            return Vec::new();
        }
        if !force && self.inner.registry.is_empty() {
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(room);
        self.inner.cursor.reset();
        while batch.len() < room && self.inner.cursor.has_next() {
            let Some(msg) = self.inner.cursor.next() else {
                break;
            };
            self.inner.cursor.remove();
            batch.push(MessageReference::new(&msg));
        }
        self.inner.paged_in.append(batch.clone(), max);
        batch
    }

    /// Offers each reference in `refs` to the current consumer snapshot via
    /// the dispatch policy. Used both for a freshly paged-in batch and for
    /// re-offering already-resident references that an earlier pass left
    /// undispatched.
    async fn dispatch_refs(&self, refs: Vec<MessageReference>) {
        if refs.is_empty() {
            return;
        }
        let consumers = self.inner.registry.snapshot();
        for reference in refs {
            if reference.is_dropped() || reference.lock_owner().is_some() {
                continue;
            }
            if reference.is_expired(Instant::now()) {
                self.drop_reference(&reference);
                continue;
            }
            let consumers_vec: Vec<_> = consumers.iter().cloned().collect();
            self.inner
                .policy
                .dispatch(
                    reference,
                    self.inner.destination.clone(),
                    consumers_vec,
                    self.inner.locks.clone(),
                )
                .await;
        }
    }

    fn finalize_drop(&self, reference: &MessageReference) {
        self.inner.locks.unlock(reference);
        self.inner.accountant.release(reference.size());
        self.inner.stats.dequeues.add(1);
        self.inner.stats.messages.add(-1);
    }

    fn drop_reference(&self, reference: &MessageReference) {
        if self.inner.paged_in.drop_and_maybe_gc(reference) {
            self.finalize_drop(reference);
        }
    }

    /// Attaches a new consumer. Closes the dispatch valve before mutating
    /// topology so no concurrent page-in/dispatch pass observes a
    /// half-registered subscription, then forces a page-in and re-offers
    /// every already-resident reference to the new consumer specifically
    /// (distinct from the page-in's own round-robin dispatch of anything
    /// freshly paged in).
    pub async fn add_subscription(&self, sub: Arc<dyn SubscriptionBoxed>) -> Result<(), QueueError> {
        let info = sub.info();

        self.inner.valve.turn_off().await;

        sub.on_added_boxed(&self.inner.destination).await;
        self.inner.stats.consumers.add(1);
        self.inner.max_paged_in.fetch_add(info.prefetch, Ordering::SeqCst);
        self.inner.registry.insert(sub.clone());

        self.page_in_and_dispatch(true).await;

        let snapshot = self.inner.paged_in.snapshot();
        let ctx = crate::subscription::DeliveryContext {
            now: Instant::now(),
            queue: self.inner.destination.clone(),
        };
        for reference in snapshot {
            if reference.is_dropped() || reference.lock_owner().is_some() {
                continue;
            }
            if !sub.matches(&reference, &ctx) {
                continue;
            }
            let owner = LockOwner {
                id: info.consumer_id,
                priority: info.priority,
                exclusive: info.exclusive,
            };
            if self.inner.locks.try_lock(&reference, owner) {
                if sub.offer_boxed(reference.clone()).await {
                    if let Some(group) = reference.group_id() {
                        self.inner.locks.bind_group(group, info.consumer_id);
                    }
                } else {
                    self.inner.locks.unlock(&reference);
                }
            }
        }

        self.inner.valve.turn_on();
        Ok(())
    }

    /// Detaches a consumer, redelivering anything it held, anything held
    /// under an exclusive lock it owned, and anything bound to a message
    /// group it owned.
    pub async fn remove_subscription(&self, consumer_id: ConsumerId) -> Result<(), QueueError> {
        let Some(sub) = self.inner.registry.find(consumer_id) else {
            return Ok(());
        };
        let info = sub.info();

        self.inner.stats.consumers.add(-1);
        self.inner.max_paged_in.fetch_sub(info.prefetch, Ordering::SeqCst);

        self.inner.valve.turn_off().await;

        self.inner.registry.remove(consumer_id);
        sub.on_removed_boxed(&self.inner.destination).await;

        let was_exclusive_owner = self.inner.locks.clear_exclusive_if(consumer_id);
        let orphaned_groups = self.inner.locks.remove_consumer_groups(consumer_id);

        if !info.browser {
            let snapshot = self.inner.paged_in.snapshot();
            let remaining = self.inner.registry.snapshot();
            for reference in snapshot {
                if reference.is_dropped() {
                    continue;
                }
                let owned_by_departing = reference.lock_owner() == Some(consumer_id);
                let orphaned_group = reference
                    .group_id()
                    .is_some_and(|g| orphaned_groups.contains(g));
                if !(owned_by_departing || was_exclusive_owner || orphaned_group) {
                    continue;
                }

                let new_count = reference.bump_redelivery();
                self.inner.locks.unlock(&reference);

                if let Some(max) = self.inner.config.max_redeliveries {
                    if new_count > max {
                        match self.inner.dead_letter.on_exhausted(&reference.body()) {
                            DeadLetterAction::Discard => {
                                self.drop_reference(&reference);
                                continue;
                            }
                            DeadLetterAction::Park => continue,
                            DeadLetterAction::Redeliver => {}
                        }
                    }
                }

                let consumers: Vec<_> = remaining.iter().cloned().collect();
                self.inner
                    .policy
                    .dispatch(
                        reference,
                        self.inner.destination.clone(),
                        consumers,
                        self.inner.locks.clone(),
                    )
                    .await;
            }
        }

        self.inner.valve.turn_on();
        Ok(())
    }

    pub async fn acknowledge(&self, ctx: &OperationContext, ack: Ack) -> Result<(), QueueError> {
        let snapshot = self.inner.paged_in.snapshot();
        let id = match ack {
            Ack::Single(id) => id,
            Ack::Range(lo, hi) => {
                let matching: Vec<_> = snapshot
                    .iter()
                    .filter(|r| !r.is_dropped() && r.id() >= lo && r.id() <= hi)
                    .collect();
                if matching.len() != 1 {
                    return Err(QueueError::BulkAckNotSupported);
                }
                matching[0].id()
            }
        };

        let Some(reference) = snapshot.iter().find(|r| r.id() == id && !r.is_dropped()) else {
            return Ok(());
        };

        if reference.is_persistent() {
            if let Some(store) = &self.inner.store {
                store
                    .remove_message_boxed(ctx, SingleAck(id))
                    .await
                    .map_err(|e| QueueError::StoreFailure(e.to_string()))?;
            }
        }
        self.drop_reference(reference);
        Ok(())
    }

    /// Walks the pending cursor (not the paged-in set) looking for `id`.
    pub async fn get_message(&self, id: MessageId) -> Option<Message> {
        self.inner.cursor.reset();
        while self.inner.cursor.has_next() {
            match self.inner.cursor.next() {
                Some(msg) if msg.id == id => return Some(msg),
                Some(_) => {}
                None => break,
            }
        }
        None
    }

    /// Snapshots every message currently visible: resident paged-in bodies
    /// first, then a non-destructive walk of the remaining pending backlog.
    pub async fn browse(&self) -> Vec<Message> {
        let mut out = Vec::new();
        for reference in self.inner.paged_in.snapshot() {
            if reference.is_dropped() {
                continue;
            }
            reference.acquire();
            out.push(reference.body());
            reference.release();
        }

        self.inner.cursor.reset();
        while self.inner.cursor.has_next() {
            match self.inner.cursor.next() {
                Some(msg) => out.push(msg),
                None => break,
            }
        }
        out
    }

    pub async fn purge(&self) -> Result<usize, QueueError> {
        self.page_in(true).await;
        let snapshot = self.inner.paged_in.snapshot();
        let mut count = 0usize;
        for reference in snapshot {
            if reference.is_dropped() {
                continue;
            }
            if !self.inner.locks.try_lock(&reference, ADMIN_OWNER) {
                continue;
            }
            if reference.is_persistent() {
                if let Some(store) = &self.inner.store {
                    if let Err(e) = store
                        .remove_message_boxed(&OperationContext::none(), SingleAck(reference.id()))
                        .await
                    {
                        tracing::warn!(error = %e, message_id = reference.id(), "store remove failed during purge, skipping");
                        self.inner.locks.unlock(&reference);
                        continue;
                    }
                }
            }
            if self.inner.paged_in.drop_no_gc(&reference) {
                self.finalize_drop(&reference);
                count += 1;
            }
        }
        self.inner.paged_in.gc();
        Ok(count)
    }

    pub async fn remove_matching(&self, filter: impl Fn(&Message) -> bool, max: usize) -> Result<usize, QueueError> {
        self.page_in(true).await;
        let snapshot = self.inner.paged_in.snapshot();
        let mut removed = 0usize;
        for reference in snapshot {
            if max > 0 && removed >= max {
                break;
            }
            if reference.is_dropped() || !filter(&reference.body()) {
                continue;
            }
            if !self.inner.locks.try_lock(&reference, ADMIN_OWNER) {
                continue;
            }
            if reference.is_persistent() {
                if let Some(store) = &self.inner.store {
                    if let Err(e) = store
                        .remove_message_boxed(&OperationContext::none(), SingleAck(reference.id()))
                        .await
                    {
                        tracing::warn!(error = %e, message_id = reference.id(), "store remove failed during removeMatching, skipping");
                        self.inner.locks.unlock(&reference);
                        continue;
                    }
                }
            }
            self.drop_reference(&reference);
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn copy_matching(
        &self,
        filter: impl Fn(&Message) -> bool,
        max: usize,
        target: &QueueCoordinator,
    ) -> Result<usize, QueueError> {
        self.page_in(true).await;
        let snapshot = self.inner.paged_in.snapshot();
        let mut copied = 0usize;
        for reference in snapshot {
            if max > 0 && copied >= max {
                break;
            }
            if reference.is_dropped() {
                continue;
            }
            reference.acquire();
            let body = reference.body();
            reference.release();
            if !filter(&body) {
                continue;
            }

            let mut copy = body;
            copy.id = target.next_message_id();
            copy.redelivery_count = 0;
            if let Err(e) = target.send(&OperationContext::none(), copy).await {
                tracing::warn!(error = %e, "copyMatching: send to target destination failed, skipping");
                continue;
            }
            copied += 1;
        }
        Ok(copied)
    }

    pub async fn move_matching(
        &self,
        filter: impl Fn(&Message) -> bool,
        max: usize,
        target: &QueueCoordinator,
    ) -> Result<usize, QueueError> {
        self.page_in(true).await;
        let snapshot = self.inner.paged_in.snapshot();
        let mut moved = 0usize;
        for reference in snapshot {
            if max > 0 && moved >= max {
                break;
            }
            if reference.is_dropped() {
                continue;
            }
            if !self.inner.locks.try_lock(&reference, ADMIN_OWNER) {
                continue;
            }

            reference.acquire();
            let body = reference.body();
            reference.release();
            if !filter(&body) {
                self.inner.locks.unlock(&reference);
                continue;
            }

            let mut copy = body;
            copy.id = target.next_message_id();
            copy.redelivery_count = 0;
            if let Err(e) = target.send(&OperationContext::none(), copy).await {
                tracing::warn!(error = %e, "moveMatching: send to target destination failed, leaving message in place");
                self.inner.locks.unlock(&reference);
                continue;
            }

            if reference.is_persistent() {
                if let Some(store) = &self.inner.store {
                    if let Err(e) = store
                        .remove_message_boxed(&OperationContext::none(), SingleAck(reference.id()))
                        .await
                    {
                        tracing::error!(error = %e, message_id = reference.id(), "moveMatching: store remove failed after copy succeeded, message now duplicated");
                    }
                }
            }
            self.drop_reference(&reference);
            moved += 1;
        }
        Ok(moved)
    }
}

impl CooperativeTask for QueueCoordinator {
    async fn iterate(&self) -> bool {
        self.page_in(false).await;
        self.inner.cursor.size() > 0
    }
}
