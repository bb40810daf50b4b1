//! Backing store capabilities.
//!
//! Queues never hold data themselves; every operation is a short fixed
//! sequence of calls against a [`Store`]. The trait lists exactly the list,
//! sorted-set and hash primitives the queues need, plus two composite calls
//! for the priority queue's index-plus-payload protocol.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use crate::error::Result;

/// A sorted-set member popped together with its payload-table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TakenPayload {
    pub member: String,
    pub score: i64,
    /// `None` when the table had no entry for `member`.
    pub payload: Option<Vec<u8>>,
}

/// Primitive operations of a remote key-value/list/sorted-set store.
///
/// Each method must be atomic on its own. Nothing spans calls unless a
/// backend overrides the composite methods.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// Insert at the head.
    async fn list_push_front(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove and return the tail.
    async fn list_pop_back(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove and return the head.
    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn zset_len(&self, key: &str) -> Result<u64>;

    /// Insert `member` or move it to `score`.
    async fn zset_upsert(&self, key: &str, member: &str, score: i64) -> Result<()>;

    /// Remove and return up to `count` lowest-score members, lowest first.
    async fn zset_pop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>>;

    async fn hash_set(&self, table: &str, field: &str, value: &[u8]) -> Result<()>;

    async fn hash_get(&self, table: &str, field: &str) -> Result<Option<Vec<u8>>>;

    async fn hash_delete(&self, table: &str, field: &str) -> Result<()>;

    /// Delete whatever structure lives at `key`. Absent keys are fine.
    async fn clear(&self, key: &str) -> Result<()>;

    /// Store `value` under `member` in `table`, then index `member` in `key`.
    ///
    /// The payload is written first so an index entry never points at
    /// nothing. Without an override a crash between the two calls leaves an
    /// unreachable table entry.
    async fn index_payload(
        &self,
        key: &str,
        table: &str,
        member: &str,
        score: i64,
        value: &[u8],
    ) -> Result<()> {
        self.hash_set(table, member, value).await?;
        self.zset_upsert(key, member, score).await
    }

    /// Pop the lowest-score member of `key`, then read and delete its entry
    /// in `table`.
    ///
    /// Without an override the member leaves the index before its payload is
    /// read; a crash in between loses the item.
    async fn take_min_payload(&self, key: &str, table: &str) -> Result<Option<TakenPayload>> {
        let Some((member, score)) = self.zset_pop_min(key, 1).await?.into_iter().next() else {
            return Ok(None);
        };
        let payload = self.hash_get(table, &member).await?;
        self.hash_delete(table, &member).await?;
        Ok(Some(TakenPayload {
            member,
            score,
            payload,
        }))
    }
}
