mod buffer_pool;
mod lock_manager;
mod transaction;

pub use buffer_pool::{BufferPool, PageRef};
pub use lock_manager::LockManager;
pub use transaction::{Permission, TransactionId};

/// Default number of pages held by a buffer pool
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Default time a lock request waits before its transaction is aborted, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
