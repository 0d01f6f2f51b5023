//! Short-lived cache for vote aggregates.
//!
//! Two backends: a process-local map, and a table in Postgres that every API
//! instance reads, so a vote handled by one instance invalidates the entry for
//! all of them.

use crate::domain::models::Aggregate;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait AggregateCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Aggregate>;
    async fn set(&self, key: &str, value: &Aggregate);
    async fn invalidate(&self, key: &str);
    /// Drops expired entries, returning how many were removed.
    async fn purge_expired(&self) -> u64;
}

#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (Instant, Aggregate)>>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }
}

#[async_trait]
impl AggregateCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Aggregate> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    async fn set(&self, key: &str, value: &Aggregate) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (Instant::now(), value.clone()));
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn purge_expired(&self) -> u64 {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        (before - entries.len()) as u64
    }
}

#[derive(Clone)]
pub struct PgCache {
    pool: PgPool,
    ttl: Duration,
}

impl PgCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl AggregateCache for PgCache {
    async fn get(&self, key: &str) -> Option<Aggregate> {
        let row: Result<Option<Json<Aggregate>>, sqlx::Error> = sqlx::query_scalar(
            "SELECT payload FROM aggregate_cache WHERE cache_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(found) => found.map(|Json(value)| value),
            Err(e) => {
                tracing::warn!("Aggregate cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Aggregate) {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(30));
        let result = sqlx::query(
            r#"
            INSERT INTO aggregate_cache (cache_key, payload, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cache_key)
            DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!("Aggregate cache write failed for {}: {}", key, e);
        }
    }

    async fn invalidate(&self, key: &str) {
        let result = sqlx::query("DELETE FROM aggregate_cache WHERE cache_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::error!("Aggregate cache invalidation failed for {}: {}", key, e);
        }
    }

    async fn purge_expired(&self) -> u64 {
        match sqlx::query("DELETE FROM aggregate_cache WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected(),
            Err(e) => {
                tracing::error!("Aggregate cache purge failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(total: i64) -> Aggregate {
        Aggregate {
            counts: BTreeMap::from([("Yes".to_string(), total)]),
            percentages: BTreeMap::from([("Yes".to_string(), 100)]),
            total,
        }
    }

    #[tokio::test]
    async fn memory_cache_round_trip_and_invalidate() {
        let cache = MemoryCache::new(Duration::from_secs(30));
        cache.set("poll_results_1", &sample(2)).await;

        assert_eq!(cache.get("poll_results_1").await, Some(sample(2)));

        cache.invalidate("poll_results_1").await;
        assert_eq!(cache.get("poll_results_1").await, None);
    }

    #[tokio::test]
    async fn memory_cache_entries_expire() {
        let cache = MemoryCache::new(Duration::from_millis(20));
        cache.set("k", &sample(1)).await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.purge_expired().await, 1);
    }

    async fn pg_cache(ttl: Duration) -> Option<PgCache> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect to DATABASE_URL");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        Some(PgCache::new(pool, ttl))
    }

    #[tokio::test]
    async fn pg_cache_round_trip_overwrite_and_invalidate() {
        let Some(cache) = pg_cache(Duration::from_secs(30)).await else { return };
        let key = format!("poll_results_{}", uuid::Uuid::new_v4());

        assert_eq!(cache.get(&key).await, None);
        cache.set(&key, &sample(2)).await;
        assert_eq!(cache.get(&key).await, Some(sample(2)));
        cache.set(&key, &sample(3)).await;
        assert_eq!(cache.get(&key).await, Some(sample(3)));

        cache.invalidate(&key).await;
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn pg_cache_entries_expire() {
        let Some(cache) = pg_cache(Duration::from_millis(50)).await else { return };
        let key = format!("sentiment_{}", uuid::Uuid::new_v4());
        cache.set(&key, &sample(1)).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&key).await, None);
        assert!(cache.purge_expired().await >= 1);
    }
}
