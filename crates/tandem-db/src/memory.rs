//! In-process durable backend.
//!
//! [`MemoryBackend`] mirrors the Redis semantics the replication and timer
//! layers rely on (missing keys read as empty, `HINCRBY` on a missing field
//! starts from zero, sorted sets order by score then member). It backs the
//! test suites and single-process demos, and can be switched "offline" to
//! exercise outage handling.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::backend::{DurableBackend, ScoredMember};
use crate::error::DbError;

#[derive(Debug, Default)]
struct SortedSet {
    by_member: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: i64, member: &str) {
        if let Some(old) = self.by_member.insert(member.to_owned(), score) {
            self.ordered.remove(&(old, member.to_owned()));
        }
        self.ordered.insert((score, member.to_owned()));
    }

    fn remove(&mut self, member: &str) -> bool {
        self.by_member
            .remove(member)
            .is_some_and(|score| self.ordered.remove(&(score, member.to_owned())))
    }
}

#[derive(Debug, Default)]
struct State {
    hashes: HashMap<String, BTreeMap<String, String>>,
    sorted: HashMap<String, SortedSet>,
}

/// Durable backend held entirely in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    available: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty, available backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`).
    ///
    /// While unavailable every operation fails with [`DbError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DbError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable);
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableBackend for MemoryBackend {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, DbError> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hset(&self, key: &str, fields: &BTreeMap<String, String>) -> Result<(), DbError> {
        let mut state = self.lock()?;
        if fields.is_empty() {
            return Ok(());
        }
        let hash = state.hashes.entry(key.to_owned()).or_default();
        hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, DbError> {
        let mut state = self.lock()?;
        let Some(hash) = state.hashes.get_mut(key) else {
            return Ok(0);
        };
        let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
        if hash.is_empty() {
            state.hashes.remove(key);
        }
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError> {
        let mut state = self.lock()?;
        let hash = state.hashes.entry(key.to_owned()).or_default();
        let current = match hash.get(field) {
            None => 0,
            Some(raw) => raw.parse::<i64>().map_err(|_err| DbError::NotAnInteger {
                key: key.to_owned(),
                field: field.to_owned(),
            })?,
        };
        let next = current.checked_add(delta).ok_or_else(|| DbError::NotAnInteger {
            key: key.to_owned(),
            field: field.to_owned(),
        })?;
        hash.insert(field.to_owned(), next.to_string());
        Ok(next)
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, DbError> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, DbError> {
        let state = self.lock()?;
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> Result<u64, DbError> {
        let state = self.lock()?;
        let len = state.hashes.get(key).map_or(0, BTreeMap::len);
        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }

    async fn del(&self, key: &str) -> Result<(), DbError> {
        let mut state = self.lock()?;
        state.hashes.remove(key);
        state.sorted.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), DbError> {
        let mut state = self.lock()?;
        state
            .sorted
            .entry(key.to_owned())
            .or_default()
            .insert(score, member);
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<ScoredMember>, DbError> {
        let state = self.lock()?;
        let Some(set) = state.sorted.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .ordered
            .iter()
            .filter(|(score, _)| (min..=max).contains(score))
            .map(|(score, member)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64, DbError> {
        let mut state = self.lock()?;
        let Some(set) = state.sorted.get_mut(key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|m| set.remove(m)).count();
        if set.by_member.is_empty() {
            state.sorted.remove(key);
        }
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn hash_set_get_delete() {
        let db = MemoryBackend::new();
        db.hset("h", &fields(&[("a", "1"), ("b", "2")])).await.unwrap();

        assert_eq!(db.hget("h", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(db.hlen("h").await.unwrap(), 2);
        assert_eq!(db.hkeys("h").await.unwrap(), vec!["a", "b"]);

        assert_eq!(db.hdel("h", &["a".to_owned(), "zz".to_owned()]).await.unwrap(), 1);
        assert_eq!(db.hget("h", "a").await.unwrap(), None);

        db.del("h").await.unwrap();
        assert!(db.hgetall("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hincrby_starts_from_zero_and_rejects_text() {
        let db = MemoryBackend::new();
        assert_eq!(db.hincrby("h", "n", 3).await.unwrap(), 3);
        assert_eq!(db.hincrby("h", "n", -5).await.unwrap(), -2);

        db.hset("h", &fields(&[("s", "\"text\"")])).await.unwrap();
        let err = db.hincrby("h", "s", 1).await;
        assert!(matches!(err, Err(DbError::NotAnInteger { .. })));
    }

    #[tokio::test]
    async fn sorted_set_orders_by_score_and_rescores() {
        let db = MemoryBackend::new();
        db.zadd("z", 30, "c").await.unwrap();
        db.zadd("z", 10, "a").await.unwrap();
        db.zadd("z", 20, "b").await.unwrap();
        db.zadd("z", 40, "a").await.unwrap();

        let due = db.zrange_by_score("z", 0, 35).await.unwrap();
        let members: Vec<_> = due.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(members, vec!["b", "c"]);

        let all = db.zrange_by_score("z", i64::MIN, i64::MAX).await.unwrap();
        assert_eq!(all.last().map(|m| m.score), Some(40));
    }

    #[tokio::test]
    async fn zrem_reports_what_it_removed() {
        let db = MemoryBackend::new();
        db.zadd("z", 1, "a").await.unwrap();
        assert_eq!(db.zrem("z", &["a".to_owned()]).await.unwrap(), 1);
        assert_eq!(db.zrem("z", &["a".to_owned()]).await.unwrap(), 0);
        assert_eq!(db.zrem("missing", &["a".to_owned()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_call() {
        let db = MemoryBackend::new();
        db.set_available(false);
        assert!(matches!(db.hget("h", "a").await, Err(DbError::Unavailable)));
        assert!(matches!(db.zadd("z", 1, "a").await, Err(DbError::Unavailable)));

        db.set_available(true);
        assert!(db.hget("h", "a").await.is_ok());
    }
}
