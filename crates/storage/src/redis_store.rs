use crate::{SourceError, StorageError, Store};
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::{collections::HashMap, fmt, time::Duration};

/// Redis-backed [`Store`].
///
/// Wraps a [`ConnectionManager`], which multiplexes one connection and
/// reconnects transparently; cloning is cheap and every operation clones the
/// handle so `&self` methods can issue commands concurrently.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the store at `url` (a `redis://` connection URL) and
    /// wipes all keys so the instance starts clean.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(connection_err)?;
        let conn = client.get_connection_manager().await.map_err(connection_err)?;
        let store = Self { conn };
        store.flush_all().await?;
        Ok(store)
    }
}

fn connection_err(err: redis::RedisError) -> StorageError {
    StorageError::Connection(Box::new(err) as SourceError)
}

fn read_err(err: redis::RedisError) -> StorageError {
    StorageError::Read(Box::new(err) as SourceError)
}

fn write_err(err: redis::RedisError) -> StorageError {
    StorageError::Write(Box::new(err) as SourceError)
}

#[async_trait]
impl Store for RedisStore {
    async fn flush_all(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHALL").query_async::<()>(&mut conn).await.map_err(write_err)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await.map_err(write_err)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(read_err)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(read_err)
    }

    async fn sorted_add_if_absent(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let added: u64 = redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(write_err)?;
        Ok(added > 0)
    }

    async fn sorted_add_if_greater(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let changed: u64 = redis::cmd("ZADD")
            .arg(key)
            .arg("GT")
            .arg("CH")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(write_err)?;
        Ok(changed > 0)
    }

    async fn sorted_add_multi(
        &self,
        entries: &[(String, String, f64)],
    ) -> Result<(), StorageError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (key, member, score) in entries {
            pipe.zadd(key, member, *score).ignore();
        }
        pipe.query_async::<()>(&mut conn).await.map_err(write_err)
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>, StorageError> {
        let mut conn = self.conn.clone();
        conn.zscore(key, member).await.map_err(read_err)
    }

    async fn sorted_rev_range(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<String>, StorageError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        conn.zrevrange(key, 0, count as isize - 1).await.map_err(read_err)
    }

    async fn queue_push_back(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await.map_err(write_err)
    }

    async fn queue_pop_front(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        conn.lpop(key, None).await.map_err(read_err)
    }

    async fn queue_len(&self, key: &str) -> Result<u64, StorageError> {
        let mut conn = self.conn.clone();
        conn.llen(key).await.map_err(read_err)
    }

    async fn counter_incr(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1u64).await.map_err(write_err)?;
        if count == 1 {
            conn.expire::<_, ()>(key, ttl.as_secs() as i64).await.map_err(write_err)?;
        }
        Ok(count)
    }
}
