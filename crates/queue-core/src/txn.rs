//! Minimal transaction-participation surface.
//!
//! The transaction manager itself lives outside this crate; a queue only
//! needs to know whether a send is inside one, and a way to register work
//! that must run after commit (or be undone, in spirit, on rollback).

use std::sync::Arc;

pub type PostTransactionAction = Box<dyn FnOnce() + Send + 'static>;

pub trait TransactionContext: Send + Sync {
    /// Registers a callback the transaction manager invokes exactly once,
    /// after the enclosing transaction commits.
    fn register_post_commit(&self, action: PostTransactionAction);

    /// Registers a callback the transaction manager invokes exactly once,
    /// if the enclosing transaction rolls back instead of committing.
    fn register_rollback(&self, action: PostTransactionAction);
}

/// Per-call context threaded through every public `QueueCoordinator`
/// operation that can participate in a transaction.
#[derive(Clone, Default)]
pub struct OperationContext {
    pub transaction: Option<Arc<dyn TransactionContext>>,
}

impl OperationContext {
    pub fn none() -> Self {
        Self { transaction: None }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}
