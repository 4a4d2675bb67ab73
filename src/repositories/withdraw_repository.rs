use crate::error::{AppError, Result};
use crate::models::{Withdraw, WithdrawStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const WITHDRAW_COLUMNS: &str = "id, account_id, provider, net_amount, gross_amount, fee_amount, currency, status, provider_reference, idempotency_key, meta, created_at, updated_at, processed_at, refunded_at";

/// Correlation columns a withdraw can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawReference {
    IdempotencyKey,
    ProviderReference,
    EndToEnd,
}

impl WithdrawReference {
    fn predicate(&self) -> &'static str {
        match self {
            WithdrawReference::IdempotencyKey => "idempotency_key = $1",
            WithdrawReference::ProviderReference => "provider_reference = $1",
            WithdrawReference::EndToEnd => "meta->>'end_to_end' = $1",
        }
    }
}

/// Fields written by the ledger engine when a withdraw transition commits.
#[derive(Debug, Clone)]
pub struct WithdrawUpdate {
    pub status: WithdrawStatus,
    pub mark_refunded: bool,
    pub mark_processed: bool,
    /// Only fills an empty `provider_reference`.
    pub provider_reference: Option<String>,
    /// Provider time of the change; `NOW()` when absent.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Merged into `meta`.
    pub meta_patch: serde_json::Value,
}

/// Repository for withdraws.
pub struct WithdrawRepository {
    pool: PgPool,
}

impl WithdrawRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a withdraw and debits its gross from the owner in one unit.
    pub async fn create_with_debit(&self, withdraw: &Withdraw) -> Result<Withdraw> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let debited = sqlx::query(
            r#"
            UPDATE accounts
            SET available_balance = available_balance - $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(withdraw.account_id)
        .bind(withdraw.gross_amount)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        if debited.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Account '{}' not found",
                withdraw.account_id
            )));
        }

        let row = sqlx::query_as::<_, Withdraw>(
            r#"
            INSERT INTO withdraws (id, account_id, provider, net_amount, gross_amount, fee_amount, currency, status, provider_reference, idempotency_key, meta, created_at, updated_at, processed_at, refunded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, account_id, provider, net_amount, gross_amount, fee_amount, currency, status, provider_reference, idempotency_key, meta, created_at, updated_at, processed_at, refunded_at
            "#,
        )
        .bind(withdraw.id)
        .bind(withdraw.account_id)
        .bind(&withdraw.provider)
        .bind(withdraw.net_amount)
        .bind(withdraw.gross_amount)
        .bind(withdraw.fee_amount)
        .bind(&withdraw.currency)
        .bind(withdraw.status)
        .bind(&withdraw.provider_reference)
        .bind(&withdraw.idempotency_key)
        .bind(&withdraw.meta)
        .bind(withdraw.created_at)
        .bind(withdraw.updated_at)
        .bind(withdraw.processed_at)
        .bind(withdraw.refunded_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a withdraw by its UUID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Withdraw>> {
        let sql = format!("SELECT {} FROM withdraws WHERE id = $1", WITHDRAW_COLUMNS);
        let row = sqlx::query_as::<_, Withdraw>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_reference(
        &self,
        reference: WithdrawReference,
        value: &str,
    ) -> Result<Option<Withdraw>> {
        let sql = format!(
            "SELECT {} FROM withdraws WHERE {} ORDER BY created_at ASC LIMIT 1",
            WITHDRAW_COLUMNS,
            reference.predicate()
        );
        let row = sqlx::query_as::<_, Withdraw>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Open withdraws whose gross falls in `[min_amount, max_amount]`.
    pub async fn find_open_by_amount(
        &self,
        min_amount: Decimal,
        max_amount: Decimal,
        since: DateTime<Utc>,
        provider: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Withdraw>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM withdraws
            WHERE status IN ('pending', 'processing')
              AND gross_amount BETWEEN $1 AND $2
              AND created_at >= $3
              AND ($4::text IS NULL OR provider = $4)
            ORDER BY created_at DESC
            LIMIT $5
            "#,
            WITHDRAW_COLUMNS
        );
        let rows = sqlx::query_as::<_, Withdraw>(&sql)
            .bind(min_amount)
            .bind(max_amount)
            .bind(since)
            .bind(provider)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Withdraw>> {
        let sql = format!("SELECT {} FROM withdraws WHERE id = $1 FOR UPDATE", WITHDRAW_COLUMNS);
        sqlx::query_as::<_, Withdraw>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::from_lock_error)
    }

    /// Persists a withdraw transition. Caller must hold the owning account's lock.
    pub async fn update_reconciled(
        conn: &mut PgConnection,
        id: Uuid,
        update: &WithdrawUpdate,
    ) -> Result<Withdraw> {
        let sql = format!(
            r#"
            UPDATE withdraws
            SET status = $2,
                meta = meta || $3::jsonb,
                refunded_at = CASE WHEN $4 THEN COALESCE(refunded_at, $7, NOW()) ELSE refunded_at END,
                processed_at = CASE WHEN $5 THEN COALESCE(processed_at, $7, NOW()) ELSE processed_at END,
                provider_reference = COALESCE(provider_reference, $6),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            WITHDRAW_COLUMNS
        );
        sqlx::query_as::<_, Withdraw>(&sql)
            .bind(id)
            .bind(update.status)
            .bind(&update.meta_patch)
            .bind(update.mark_refunded)
            .bind(update.mark_processed)
            .bind(&update.provider_reference)
            .bind(update.occurred_at)
            .fetch_one(conn)
            .await
            .map_err(AppError::Database)
    }
}
