//! Point-to-point queue engine: pending backlog, bounded paged-in working
//! set, and competing-consumer dispatch, independent of any wire protocol
//! or storage technology.
//!
//! The concurrency model is five named critical sections plus one barrier:
//! `dispatch_mutex` orders against `cursor`/`paged_in`/`registry`/`locks`
//! acquisition as documented on [`coordinator::QueueCoordinator`]; the
//! dispatch valve in [`valve`] is the barrier and stands outside that order.

mod accountant;
mod config;
mod coordinator;
mod cursor;
mod dead_letter;
mod error;
mod invariants;
mod lockgroup;
mod message;
mod paged_in;
mod policy;
mod reference;
mod registry;
mod store;
mod stats;
mod subscription;
mod task;
mod txn;
mod valve;

pub use accountant::{UsageAccountant, UsageManager};
pub use config::QueueConfig;
pub use coordinator::{QueueCoordinator, QueueCoordinatorOptions, RecoveryStats};
pub use cursor::{MemoryCursor, PendingCursor};
pub use dead_letter::{DeadLetterAction, DeadLetterStrategy, NullDeadLetterStrategy};
pub use error::{CursorError, QueueError, StoreError};
pub use lockgroup::{ConsumerId, LockGroupManager, LockOwner, ADMIN_OWNER};
pub use message::{Ack, DestinationId, DestinationKind, Message, MessageId, TransactionId};
pub use paged_in::PagedInSet;
pub use policy::{DispatchPolicy, RoundRobinPolicy};
pub use reference::MessageReference;
pub use registry::SubscriptionRegistry;
pub use stats::{Gauge, Stats};
pub use store::{MessageStore, MessageStoreBoxed, RecoveryListener, SingleAck};
pub use subscription::{ConsumerInfo, DeliveryContext, Subscription, SubscriptionBoxed};
pub use task::{CooperativeTask, CooperativeTaskBoxed, TaskRunner, TaskRunnerBoxed};
pub use txn::{OperationContext, PostTransactionAction, TransactionContext};
pub use valve::DispatchValve;
