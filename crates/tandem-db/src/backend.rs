//! The durable backend contract.
//!
//! Two Redis-shaped structures are all the replication and timer layers
//! need: per-key hash maps holding store documents, and score-ordered sets
//! holding the timer queue. Scores are milliseconds since the Unix epoch.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::DbError;

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    /// The member value.
    pub member: String,
    /// The score, in milliseconds.
    pub score: i64,
}

/// Persistent hash-map and sorted-set storage.
///
/// Implementations must make single-field `hset`/`hincrby` atomic and a
/// multi-field `hset` atomic as a batch. Nothing else is transactional.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Read one field of a hash.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, DbError>;

    /// Write one or more fields of a hash in a single call.
    async fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> Result<(), DbError>;

    /// Remove fields from a hash. Returns how many existed.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, DbError>;

    /// Add `delta` to an integer field (missing counts as 0). Returns the new value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError>;

    /// Read every field of a hash.
    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, DbError>;

    /// List the field names of a hash.
    async fn hkeys(&self, key: &str) -> Result<Vec<String>, DbError>;

    /// Count the fields of a hash.
    async fn hlen(&self, key: &str) -> Result<u64, DbError>;

    /// Delete a whole key.
    async fn del(&self, key: &str) -> Result<(), DbError>;

    /// Insert or rescore a sorted-set member.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), DbError>;

    /// Members with `min <= score <= max`, ascending by score.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<ScoredMember>, DbError>;

    /// Remove sorted-set members. Returns how many existed.
    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64, DbError>;
}
