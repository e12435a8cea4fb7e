//! Integration tests for the `Dragonfly` backend.
//!
//! These tests require a live Dragonfly (or Redis) instance.
//! Run with:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p tandem-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;

use tandem_db::{DragonflyPool, DurableBackend};

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

async fn connect_clean() -> DragonflyPool {
    let pool = DragonflyPool::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly -- is Docker running?");
    pool.flush_all().await.expect("Failed to flush");
    pool
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_hash_roundtrip() {
    let pool = connect_clean().await;

    let mut fields = BTreeMap::new();
    fields.insert("u1".to_owned(), r#"{"x":1,"y":2}"#.to_owned());
    fields.insert("score".to_owned(), "10".to_owned());
    pool.hset("t3_test:players", &fields).await.expect("hset");

    let all = pool.hgetall("t3_test:players").await.expect("hgetall");
    assert_eq!(all, fields);
    assert_eq!(pool.hlen("t3_test:players").await.expect("hlen"), 2);

    let next = pool
        .hincrby("t3_test:players", "score", 5)
        .await
        .expect("hincrby");
    assert_eq!(next, 15);

    let removed = pool
        .hdel("t3_test:players", &["u1".to_owned()])
        .await
        .expect("hdel");
    assert_eq!(removed, 1);
    assert_eq!(pool.hget("t3_test:players", "u1").await.expect("hget"), None);

    pool.del("t3_test:players").await.expect("del");
    assert!(pool.hkeys("t3_test:players").await.expect("hkeys").is_empty());
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_sorted_set_range_and_remove() {
    let pool = connect_clean().await;

    pool.zadd("timeouts", 6_000, "b").await.expect("zadd");
    pool.zadd("timeouts", 1_000, "a").await.expect("zadd");
    pool.zadd("timeouts", 9_000, "c").await.expect("zadd");

    let due = pool
        .zrange_by_score("timeouts", 0, 7_000)
        .await
        .expect("zrange");
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].member, "a");
    assert_eq!(due[0].score, 1_000);
    assert_eq!(due[1].member, "b");

    let removed = pool
        .zrem("timeouts", &["a".to_owned(), "missing".to_owned()])
        .await
        .expect("zrem");
    assert_eq!(removed, 1);

    pool.flush_all().await.expect("Failed to flush");
}
