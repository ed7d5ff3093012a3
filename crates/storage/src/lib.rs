//! Cache storage for the txscope mempool observatory.
//!
//! Three layers live here, leaves first:
//!
//! - [`keys`] — deterministic construction of every cache key; no other
//!   module interpolates key strings.
//! - [`Store`] — the adapter contract over a hash-map + sorted-set +
//!   list-queue store, with a Redis implementation ([`RedisStore`]) for
//!   production and an in-memory one ([`MemoryStore`]) for tests and
//!   offline development.
//! - [`ClientStorage`] — the per-client lifecycle record operations built
//!   on top of the adapter.

pub mod keys;

mod error;
pub use error::{SourceError, StorageError};

mod store;
pub use store::Store;

mod redis_store;
pub use redis_store::RedisStore;

mod memory;
pub use memory::MemoryStore;

mod client;
pub use client::{ClientStorage, UpdateOutcome};
