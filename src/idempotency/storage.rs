use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// A delivery stuck in PROCESSING this long is assumed abandoned and may be reclaimed.
const STALE_PROCESSING_SECS: i64 = 300;

const DELIVERY_COLUMNS: &str = "id, delivery_key, provider, status, outcome, error_message, created_at, expires_at, completed_at";

/// Status of a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Processing,
    Completed,
    Failed,
}

/// One inbound webhook body, keyed by its content hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub delivery_key: String,
    pub provider: String,
    pub status: DeliveryStatus,
    /// Serialized pipeline outcome, replayed to duplicates.
    pub outcome: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn new(delivery_key: impl Into<String>, provider: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            delivery_key: delivery_key.into(),
            provider: provider.into(),
            status: DeliveryStatus::Processing,
            outcome: None,
            error_message: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            completed_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == DeliveryStatus::Completed
    }
}

/// PostgreSQL-backed delivery log.
pub struct PostgresDeliveryStore {
    pool: PgPool,
}

impl PostgresDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claims a delivery key. Returns Ok(None) when this caller owns it now
    /// (new key, or a failed, expired or abandoned one), or the live record
    /// that blocks it.
    pub async fn try_acquire(&self, record: &DeliveryRecord) -> Result<Option<DeliveryRecord>> {
        let sql = format!(
            r#"
            INSERT INTO webhook_deliveries ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (delivery_key) DO UPDATE
            SET id = EXCLUDED.id,
                status = EXCLUDED.status,
                outcome = NULL,
                error_message = NULL,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                completed_at = NULL
            WHERE webhook_deliveries.status = 'FAILED'
               OR webhook_deliveries.expires_at < NOW()
               OR (webhook_deliveries.status = 'PROCESSING'
                   AND webhook_deliveries.created_at < NOW() - make_interval(secs => $10))
            RETURNING {cols}
            "#,
            cols = DELIVERY_COLUMNS
        );
        let claimed = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(record.id)
            .bind(&record.delivery_key)
            .bind(&record.provider)
            .bind(record.status)
            .bind(&record.outcome)
            .bind(&record.error_message)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.completed_at)
            .bind(STALE_PROCESSING_SECS as f64)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        match claimed {
            Some(_) => Ok(None),
            None => self.find_by_key(&record.delivery_key).await,
        }
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<DeliveryRecord>> {
        let sql = format!(
            "SELECT {} FROM webhook_deliveries WHERE delivery_key = $1",
            DELIVERY_COLUMNS
        );
        let record = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(record)
    }

    pub async fn mark_completed(
        &self,
        key: &str,
        outcome: serde_json::Value,
    ) -> Result<Option<DeliveryRecord>> {
        let sql = format!(
            r#"
            UPDATE webhook_deliveries
            SET status = 'COMPLETED', outcome = $2, completed_at = NOW()
            WHERE delivery_key = $1
            RETURNING {}
            "#,
            DELIVERY_COLUMNS
        );
        let record = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(key)
            .bind(outcome)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(record)
    }

    pub async fn mark_failed(&self, key: &str, error_message: &str) -> Result<Option<DeliveryRecord>> {
        let sql = format!(
            r#"
            UPDATE webhook_deliveries
            SET status = 'FAILED', error_message = $2, completed_at = NOW()
            WHERE delivery_key = $1
            RETURNING {}
            "#,
            DELIVERY_COLUMNS
        );
        let record = sqlx::query_as::<_, DeliveryRecord>(&sql)
            .bind(key)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(record)
    }

    /// Deletes expired deliveries.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM webhook_deliveries WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

/// Redis front for the delivery log. Only ever a hint: Postgres decides.
pub struct RedisDeliveryCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisDeliveryCache {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn make_key(&self, delivery_key: &str) -> String {
        format!("{}:{}", self.key_prefix, delivery_key)
    }

    /// SET NX EX. Returns true if the key was newly set.
    pub async fn try_set(&self, delivery_key: &str, ttl_seconds: i64) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let key = self.make_key(delivery_key);
        let result: redis::RedisResult<Option<String>> = conn
            .set_options(
                &key,
                "processing",
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl_seconds.max(1) as usize)),
            )
            .await;

        get_metrics().record_redis_operation("set_nx", timer.elapsed_ms(), result.is_ok());
        Ok(result.map_err(AppError::Redis)?.is_some())
    }

    pub async fn set_completed(&self, delivery_key: &str, ttl_seconds: i64) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let key = self.make_key(delivery_key);
        let _: () = conn
            .set_ex(&key, "completed", ttl_seconds.max(1) as u64)
            .await
            .map_err(AppError::Redis)?;

        Ok(())
    }

    pub async fn delete(&self, delivery_key: &str) -> Result<bool> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let key = self.make_key(delivery_key);
        let deleted: i64 = conn.del(&key).await.map_err(AppError::Redis)?;

        Ok(deleted > 0)
    }
}

/// Postgres log with an optional Redis fast path.
pub struct HybridDeliveryStore {
    postgres: PostgresDeliveryStore,
    redis: Option<RedisDeliveryCache>,
    ttl_seconds: i64,
}

impl HybridDeliveryStore {
    pub fn new(postgres: PostgresDeliveryStore, redis: Option<RedisDeliveryCache>, ttl_seconds: i64) -> Self {
        Self {
            postgres,
            redis,
            ttl_seconds,
        }
    }

    /// Claims a delivery key, returning the blocking record if someone else holds it.
    pub async fn try_acquire(&self, record: &DeliveryRecord) -> Result<Option<DeliveryRecord>> {
        if let Some(redis) = &self.redis {
            match redis.try_set(&record.delivery_key, self.ttl_seconds).await {
                Ok(true) => {}
                Ok(false) => {
                    // Seen recently; Postgres says whether it finished, failed or is in flight.
                    if let Some(existing) = self.postgres.find_by_key(&record.delivery_key).await? {
                        if existing.is_completed() && !existing.is_expired() {
                            return Ok(Some(existing));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Redis unavailable for delivery dedupe, using Postgres only"),
            }
        }

        match self.postgres.try_acquire(record).await {
            Ok(existing) => Ok(existing),
            Err(e) => {
                self.forget(&record.delivery_key).await;
                Err(e)
            }
        }
    }

    pub async fn mark_completed(
        &self,
        delivery_key: &str,
        outcome: serde_json::Value,
    ) -> Result<Option<DeliveryRecord>> {
        let record = self.postgres.mark_completed(delivery_key, outcome).await?;

        if let (Some(redis), Some(_)) = (&self.redis, &record) {
            if let Err(e) = redis.set_completed(delivery_key, self.ttl_seconds).await {
                warn!(error = %e, "Failed to cache completed delivery");
            }
        }

        Ok(record)
    }

    /// Failed deliveries must be re-runnable, so the cache entry goes too.
    pub async fn mark_failed(&self, delivery_key: &str, error_message: &str) -> Result<Option<DeliveryRecord>> {
        let record = self.postgres.mark_failed(delivery_key, error_message).await?;
        self.forget(delivery_key).await;
        Ok(record)
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.postgres.cleanup_expired().await
    }

    async fn forget(&self, delivery_key: &str) {
        if let Some(redis) = &self.redis {
            redis.delete(delivery_key).await.ok();
        }
    }
}
