//! `Dragonfly` (Redis-compatible) durable backend.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{scope}:{store}` | Hash | Scoped store document, one JSON value per field |
//! | `{store}` | Hash | Global store document |
//! | `timeouts` | Sorted set | Pending timer ids scored by fire time |
//! | `timeouts:events` | Hash | Timer event bodies keyed by timer id |

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use fred::prelude::*;

use crate::backend::{DurableBackend, ScoredMember};
use crate::error::DbError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and implements [`DurableBackend`] on it.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!(url, "Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}

// Redis scores are doubles; millisecond timestamps stay well inside the
// 2^53 range a double represents exactly.
#[allow(clippy::cast_precision_loss)]
fn to_score(ms: i64) -> f64 {
    ms as f64
}

#[allow(clippy::cast_possible_truncation)]
fn from_score(score: f64) -> i64 {
    score as i64
}

#[async_trait]
impl DurableBackend for DragonflyPool {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, DbError> {
        let value: Option<String> = self.client.hget(key, field).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> Result<(), DbError> {
        if fields.is_empty() {
            return Ok(());
        }
        let _: u64 = self.client.hset(key, fields.clone()).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, DbError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.client.hdel(key, fields.to_vec()).await?;
        Ok(removed)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError> {
        let value: i64 = self.client.hincrby(key, field, delta).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, DbError> {
        let values: HashMap<String, String> = self.client.hgetall(key).await?;
        Ok(values.into_iter().collect())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, DbError> {
        let keys: Vec<String> = self.client.hkeys(key).await?;
        Ok(keys)
    }

    async fn hlen(&self, key: &str) -> Result<u64, DbError> {
        let len: u64 = self.client.hlen(key).await?;
        Ok(len)
    }

    async fn del(&self, key: &str) -> Result<(), DbError> {
        let _: u64 = self.client.del(key).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), DbError> {
        let _: u64 = self
            .client
            .zadd(key, None, None, false, false, (to_score(score), member))
            .await?;
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<ScoredMember>, DbError> {
        let entries: Vec<(String, f64)> = self
            .client
            .zrangebyscore(key, to_score(min), to_score(max), true, None)
            .await?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| ScoredMember {
                member,
                score: from_score(score),
            })
            .collect())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64, DbError> {
        if members.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.client.zrem(key, members.to_vec()).await?;
        Ok(removed)
    }
}
