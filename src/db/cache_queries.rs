use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

/// One durable cache row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub value: Vec<u8>,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// L2 of the hybrid cache. A trait so the cache logic is testable without
/// the durable substrate.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheRow>, sqlx::Error>;
    async fn put(&self, key: &str, row: &CacheRow) -> Result<(), sqlx::Error>;
    async fn delete(&self, key: &str) -> Result<(), sqlx::Error>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error>;
}

pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRow>, sqlx::Error> {
        let row = sqlx::query("SELECT value, inserted_at, expires_at FROM cache WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(CacheRow {
                value: row.try_get("value")?,
                inserted_at: row.try_get("inserted_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn put(&self, key: &str, row: &CacheRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cache (key, value, inserted_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                inserted_at = EXCLUDED.inserted_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(&row.value)
        .bind(row.inserted_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
