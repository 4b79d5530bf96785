use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use rota_model::RequesterId;

use super::{BanStore, BlobStore, CounterStore, PermanentBan};
use crate::error::{EngineError, Result};
use crate::logical_day::LogicalDay;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Blob, counter, and ban stores sharing one connection pool.
#[derive(Clone)]
pub struct PostgresStores {
    pool: PgPool,
}

impl fmt::Debug for PostgresStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStores")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;

        MIGRATOR.run(&pool).await.map_err(|err| {
            EngineError::Persistence(format!("migration failed: {err}"))
        })?;
        info!("rota schema migrations applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn persistence(context: &str, err: sqlx::Error) -> EngineError {
    EngineError::Persistence(format!("{context}: {err}"))
}

fn count_from_db(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

#[async_trait]
impl BlobStore for PostgresStores {
    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT payload FROM rota_blobs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| persistence("failed to load blob", err))
    }

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rota_blobs (key, payload, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .map_err(|err| persistence("failed to save blob", err))?;

        Ok(())
    }
}

#[async_trait]
impl CounterStore for PostgresStores {
    async fn increment(&self, key: &str, day: LogicalDay) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO rota_counters (day, key, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (day, key)
            DO UPDATE SET count = rota_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(day.date())
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| persistence("failed to increment counter", err))?;

        Ok(count_from_db(count))
    }

    async fn get(&self, key: &str, day: LogicalDay) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i32>(
            "SELECT count FROM rota_counters WHERE day = $1 AND key = $2",
        )
        .bind(day.date())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| persistence("failed to read counter", err))?;

        Ok(count.map(count_from_db).unwrap_or(0))
    }

    async fn get_many(
        &self,
        keys: &[String],
        day: LogicalDay,
    ) -> Result<HashMap<String, u32>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, i32)>(
            "SELECT key, count FROM rota_counters WHERE day = $1 AND key = ANY($2)",
        )
        .bind(day.date())
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| persistence("failed to read counters", err))?;

        Ok(rows
            .into_iter()
            .map(|(key, count)| (key, count_from_db(count)))
            .collect())
    }

    async fn purge_before(&self, day: LogicalDay) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM rota_counters WHERE day < $1")
            .bind(day.date())
            .execute(&self.pool)
            .await
            .map_err(|err| persistence("failed to purge counters", err))?
            .rows_affected();

        Ok(affected)
    }
}

#[async_trait]
impl BanStore for PostgresStores {
    async fn add(&self, requester: RequesterId, at: DateTime<Utc>) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO rota_permanent_bans (requester_id, banned_at)
            VALUES ($1, $2)
            ON CONFLICT (requester_id) DO NOTHING
            "#,
        )
        .bind(requester.as_i64())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|err| persistence("failed to add permanent ban", err))?
        .rows_affected();

        Ok(inserted > 0)
    }

    async fn remove(&self, requester: RequesterId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM rota_permanent_bans WHERE requester_id = $1")
            .bind(requester.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|err| persistence("failed to remove permanent ban", err))?
            .rows_affected();

        Ok(removed > 0)
    }

    async fn contains(&self, requester: RequesterId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM rota_permanent_bans WHERE requester_id = $1)",
        )
        .bind(requester.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| persistence("failed to check permanent ban", err))?;

        Ok(exists)
    }

    async fn list(&self) -> Result<Vec<PermanentBan>> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT requester_id, banned_at FROM rota_permanent_bans ORDER BY requester_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| persistence("failed to list permanent bans", err))?;

        Ok(rows
            .into_iter()
            .map(|(requester, banned_at)| PermanentBan {
                requester: RequesterId(requester),
                banned_at,
            })
            .collect())
    }
}
