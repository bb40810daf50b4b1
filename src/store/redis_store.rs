//! Redis-backed store.
//!
//! Lists map to LPUSH/RPOP/LPOP, sorted sets to ZADD/ZPOPMIN, the payload
//! table to a plain hash. The priority-queue composites run server-side in one
//! step: push is a MULTI/EXEC pipeline, pop is a Lua script, so neither can be
//! interrupted halfway by a crashing worker.

use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use secrecy::{ExposeSecret, SecretString};

use super::{Store, TakenPayload};
use crate::error::{Error, Result};

/// Pops the lowest-score member and hands back its payload, deleting both.
const TAKE_MIN_LUA: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1], 1)
if #popped == 0 then
    return nil
end
local payload = redis.call('HGET', KEYS[2], popped[1])
redis.call('HDEL', KEYS[2], popped[1])
return {popped[1], popped[2], payload}
"#;

/// Configuration for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Connection URL. May carry a password, hence secret.
    pub url: SecretString,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: SecretString::from("redis://127.0.0.1:6379"),
        }
    }
}

impl RedisStoreConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            url: SecretString::from(url),
        }
    }
}

/// [`Store`] over a Redis (or protocol-compatible) server.
pub struct RedisStore {
    connection: MultiplexedConnection,
    take_min: Script,
}

impl RedisStore {
    /// Open a multiplexed connection shared by every call on this store.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.expose_secret())
            .map_err(|e| Error::Config(format!("invalid store url: {e}")))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Store(format!("failed to connect: {e}")))?;

        tracing::debug!("connected to redis store");

        Ok(Self {
            connection,
            take_min: Script::new(TAKE_MIN_LUA),
        })
    }

    /// Multiplexed connections are cheap handles onto one socket.
    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn list_len(&self, key: &str) -> Result<u64> {
        let len = redis::cmd("LLEN")
            .arg(key)
            .query_async::<u64>(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn list_push_front(&self, key: &str, value: &[u8]) -> Result<()> {
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn list_pop_back(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = redis::cmd("RPOP")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = redis::cmd("LPOP")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn zset_len(&self, key: &str) -> Result<u64> {
        let len = redis::cmd("ZCARD")
            .arg(key)
            .query_async::<u64>(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn zset_upsert(&self, key: &str, member: &str, score: i64) -> Result<()> {
        redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zset_pop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>> {
        let popped = redis::cmd("ZPOPMIN")
            .arg(key)
            .arg(count)
            .query_async::<Vec<(String, f64)>>(&mut self.conn())
            .await?;
        popped
            .into_iter()
            .map(|(member, score)| Ok((member, whole_score(score)?)))
            .collect()
    }

    async fn hash_set(&self, table: &str, field: &str, value: &[u8]) -> Result<()> {
        redis::cmd("HSET")
            .arg(table)
            .arg(field)
            .arg(value)
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn hash_get(&self, table: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let value = redis::cmd("HGET")
            .arg(table)
            .arg(field)
            .query_async::<Option<Vec<u8>>>(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn hash_delete(&self, table: &str, field: &str) -> Result<()> {
        redis::cmd("HDEL")
            .arg(table)
            .arg(field)
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn index_payload(
        &self,
        key: &str,
        table: &str,
        member: &str,
        score: i64,
        value: &[u8],
    ) -> Result<()> {
        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(table)
            .arg(member)
            .arg(value)
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .query_async::<()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn take_min_payload(&self, key: &str, table: &str) -> Result<Option<TakenPayload>> {
        let mut invocation = self.take_min.prepare_invoke();
        invocation.key(key).key(table);
        let reply = invocation
            .invoke_async::<Option<(String, f64, Option<Vec<u8>>)>>(&mut self.conn())
            .await?;

        reply
            .map(|(member, score, payload)| {
                Ok(TakenPayload {
                    member,
                    score: whole_score(score)?,
                    payload,
                })
            })
            .transpose()
    }
}

/// Convert a Redis score back to the integer it was written as.
///
/// Another producer sharing the key may have written a fractional or
/// infinite score; those are rejected instead of truncated.
fn whole_score(score: f64) -> Result<i64> {
    let in_range = score >= i64::MIN as f64 && score < i64::MAX as f64;
    if !score.is_finite() || score.fract() != 0.0 || !in_range {
        return Err(Error::Store(format!("sorted-set score {score} is not an integer")));
    }
    Ok(score as i64)
}
