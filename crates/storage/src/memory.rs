use crate::{StorageError, Store};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

/// In-memory [`Store`] for tests and offline development.
///
/// Mirrors the conditional-add and queue semantics of the Redis backend;
/// counter TTLs are not enforced since instances never outlive a process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sorted: HashMap<String, HashMap<String, f64>>,
    queues: HashMap<String, VecDeque<String>>,
    counters: HashMap<String, u64>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn flush_all(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        *inner = Inner::default();
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.hashes.entry(key.to_owned()).or_default().insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.hashes.get(key).and_then(|fields| fields.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn sorted_add_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let set = inner.sorted.entry(key.to_owned()).or_default();
        if set.contains_key(member) {
            return Ok(false);
        }
        set.insert(member.to_owned(), score);
        Ok(true)
    }

    async fn sorted_add_if_greater(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let set = inner.sorted.entry(key.to_owned()).or_default();
        match set.get(member) {
            Some(current) if score <= *current => Ok(false),
            _ => {
                set.insert(member.to_owned(), score);
                Ok(true)
            }
        }
    }

    async fn sorted_add_multi(
        &self,
        entries: &[(String, String, f64)],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        for (key, member, score) in entries {
            inner.sorted.entry(key.clone()).or_default().insert(member.clone(), *score);
        }
        Ok(())
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.sorted.get(key).and_then(|set| set.get(member)).copied())
    }

    async fn sorted_rev_range(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut members: Vec<(&String, f64)> = inner
            .sorted
            .get(key)
            .map(|set| set.iter().map(|(member, score)| (member, *score)).collect())
            .unwrap_or_default();
        // Highest score first; ties reverse-lexicographic, as ZREVRANGE orders them.
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));
        Ok(members.into_iter().take(count).map(|(member, _)| member.clone()).collect())
    }

    async fn queue_push_back(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.queues.entry(key.to_owned()).or_default().push_back(value.to_owned());
        Ok(())
    }

    async fn queue_pop_front(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.queues.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn queue_len(&self, key: &str) -> Result<u64, StorageError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.queues.get(key).map(VecDeque::len).unwrap_or_default() as u64)
    }

    async fn counter_incr(&self, key: &str, _ttl: Duration) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let count = inner.counters.entry(key.to_owned()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
