use crate::StorageError;
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug, time::Duration};

/// Contract over the backing key-value store.
///
/// The store exposes hash-maps with field-level access, sorted sets with
/// conditional add, FIFO list-queues, TTL counters, and a pipelined
/// multi-add for index writes. No component talks to the raw client; all
/// synchronisation is delegated to the backend's per-command atomicity.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    /// Deletes every key, guaranteeing a clean instance at startup.
    async fn flush_all(&self) -> Result<(), StorageError>;

    /// Sets a hash-map field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    /// Reads a hash-map field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StorageError>;

    /// Reads all fields of a hash-map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;

    /// Adds a member to a sorted set only if absent (first writer wins).
    ///
    /// Returns whether the member was inserted.
    async fn sorted_add_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError>;

    /// Adds or updates a member only when the new score is strictly greater
    /// than the current one (or the member is absent).
    ///
    /// Returns whether the set changed.
    async fn sorted_add_if_greater(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError>;

    /// Unconditional sorted-set adds, pipelined into one round trip.
    ///
    /// Entries are `(key, member, score)`.
    async fn sorted_add_multi(&self, entries: &[(String, String, f64)])
        -> Result<(), StorageError>;

    /// Reads a member's score.
    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError>;

    /// The `count` highest-scored members, highest first. Ties order by
    /// reverse-lexicographic member, matching ZREVRANGE.
    async fn sorted_rev_range(&self, key: &str, count: usize) -> Result<Vec<String>, StorageError>;

    /// Appends a value to the back of a list-queue.
    async fn queue_push_back(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Pops the front of a list-queue, if any.
    async fn queue_pop_front(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Current length of a list-queue.
    async fn queue_len(&self, key: &str) -> Result<u64, StorageError>;

    /// Increments a counter, arming `ttl` on first touch.
    ///
    /// Returns the post-increment value.
    async fn counter_incr(&self, key: &str, ttl: Duration) -> Result<u64, StorageError>;
}
