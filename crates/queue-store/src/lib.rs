//! Two [`queue_core::MessageStore`] implementations: a volatile in-memory
//! store for tests and non-persistent queues, and a write-ahead-log-backed
//! store for durable ones.

mod in_memory;
mod wal;
mod wal_cursor;
mod wal_record;

pub use in_memory::InMemoryStore;
pub use wal::WalStore;
pub use wal_cursor::WalCursor;
