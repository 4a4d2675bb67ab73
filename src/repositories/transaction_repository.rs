use crate::error::{AppError, Result};
use crate::models::{CanonicalStatus, CashInTransaction, WalletFootprint};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const CASH_IN_COLUMNS: &str = "id, account_id, direction, provider, gross_amount, fee_amount, currency, status, applied_available_amount, applied_blocked_amount, external_reference, provider_transaction_id, txid, end_to_end_id, provider_fee_amount, provider_payload, created_at, updated_at, paid_at, canceled_at";

/// Correlation columns a cash-in can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashInReference {
    ExternalReference,
    ProviderTransactionId,
    Txid,
    EndToEndId,
}

impl CashInReference {
    fn column(&self) -> &'static str {
        match self {
            CashInReference::ExternalReference => "external_reference",
            CashInReference::ProviderTransactionId => "provider_transaction_id",
            CashInReference::Txid => "txid",
            CashInReference::EndToEndId => "end_to_end_id",
        }
    }
}

/// Fields written by the ledger engine when a transition commits.
#[derive(Debug, Clone)]
pub struct CashInUpdate {
    pub status: CanonicalStatus,
    pub footprint: WalletFootprint,
    pub fee_amount: Option<Decimal>,
    /// Correlation ids only fill empty columns, so a record matched by a weak
    /// tier becomes findable by exact id on the next webhook.
    pub provider_transaction_id: Option<String>,
    pub txid: Option<String>,
    pub end_to_end_id: Option<String>,
    pub provider_fee: Option<Decimal>,
    /// Provider time of the change; `NOW()` when absent.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Raw webhook body appended to the payload history.
    pub payload: Option<serde_json::Value>,
}

/// Repository for cash-in transactions.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new cash-in record.
    pub async fn create(&self, tx: &CashInTransaction) -> Result<CashInTransaction> {
        let sql = format!(
            r#"
            INSERT INTO cash_in_transactions (id, account_id, direction, provider, gross_amount, fee_amount, currency, status, applied_available_amount, applied_blocked_amount, external_reference, provider_transaction_id, txid, end_to_end_id, provider_payload, created_at, updated_at, paid_at, canceled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            CASH_IN_COLUMNS
        );
        let row = sqlx::query_as::<_, CashInTransaction>(&sql)
        .bind(tx.id)
        .bind(tx.account_id)
        .bind(tx.direction)
        .bind(&tx.provider)
        .bind(tx.gross_amount)
        .bind(tx.fee_amount)
        .bind(&tx.currency)
        .bind(tx.status)
        .bind(tx.applied_available_amount)
        .bind(tx.applied_blocked_amount)
        .bind(&tx.external_reference)
        .bind(&tx.provider_transaction_id)
        .bind(&tx.txid)
        .bind(&tx.end_to_end_id)
        .bind(&tx.provider_payload)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.paid_at)
        .bind(tx.canceled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a cash-in by its UUID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CashInTransaction>> {
        let sql = format!("SELECT {} FROM cash_in_transactions WHERE id = $1", CASH_IN_COLUMNS);
        let row = sqlx::query_as::<_, CashInTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Exact match on one correlation column. Oldest record wins if the
    /// column is not unique.
    pub async fn find_by_reference(
        &self,
        reference: CashInReference,
        value: &str,
    ) -> Result<Option<CashInTransaction>> {
        let sql = format!(
            "SELECT {} FROM cash_in_transactions WHERE {} = $1 ORDER BY created_at ASC LIMIT 1",
            CASH_IN_COLUMNS,
            reference.column()
        );
        let row = sqlx::query_as::<_, CashInTransaction>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Open cash-ins whose gross falls in `[min_amount, max_amount]` and that
    /// were created after `since`.
    pub async fn find_open_by_amount(
        &self,
        min_amount: Decimal,
        max_amount: Decimal,
        since: DateTime<Utc>,
        provider: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CashInTransaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM cash_in_transactions
            WHERE status IN ('PENDENTE', 'MED')
              AND gross_amount BETWEEN $1 AND $2
              AND created_at >= $3
              AND ($4::text IS NULL OR provider = $4)
            ORDER BY created_at DESC
            LIMIT $5
            "#,
            CASH_IN_COLUMNS
        );
        let rows = sqlx::query_as::<_, CashInTransaction>(&sql)
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

    /// Locks a cash-in row and returns its persisted state.
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<CashInTransaction>> {
        let sql = format!(
            "SELECT {} FROM cash_in_transactions WHERE id = $1 FOR UPDATE",
            CASH_IN_COLUMNS
        );
        sqlx::query_as::<_, CashInTransaction>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::from_lock_error)
    }

    /// Persists status, footprint and history in one statement. Caller must
    /// hold the owning account's lock.
    pub async fn update_reconciled(
        conn: &mut PgConnection,
        id: Uuid,
        update: &CashInUpdate,
    ) -> Result<CashInTransaction> {
        let sql = format!(
            r#"
            UPDATE cash_in_transactions
            SET status = $2::cash_in_status,
                applied_available_amount = $3,
                applied_blocked_amount = $4,
                fee_amount = COALESCE($5, fee_amount),
                end_to_end_id = COALESCE(end_to_end_id, $6),
                provider_payload = CASE
                    WHEN $7::jsonb IS NULL THEN provider_payload
                    ELSE provider_payload || jsonb_build_array($7::jsonb)
                END,
                paid_at = CASE
                    WHEN $2::cash_in_status = 'PAGA' THEN COALESCE(paid_at, $8, NOW())
                    ELSE paid_at
                END,
                canceled_at = CASE
                    WHEN $2::cash_in_status IN ('FALHA', 'ERRO') THEN COALESCE(canceled_at, $8, NOW())
                    ELSE canceled_at
                END,
                provider_transaction_id = COALESCE(provider_transaction_id, $9),
                txid = COALESCE(
                    txid,
                    CASE
                        WHEN EXISTS (SELECT 1 FROM cash_in_transactions other WHERE other.txid = $10 AND other.id <> $1)
                        THEN NULL
                        ELSE $10
                    END
                ),
                provider_fee_amount = COALESCE($11, provider_fee_amount),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CASH_IN_COLUMNS
        );
        sqlx::query_as::<_, CashInTransaction>(&sql)
            .bind(id)
            .bind(update.status)
            .bind(update.footprint.available)
            .bind(update.footprint.blocked)
            .bind(update.fee_amount)
            .bind(&update.end_to_end_id)
            .bind(&update.payload)
            .bind(update.occurred_at)
            .bind(&update.provider_transaction_id)
            .bind(&update.txid)
            .bind(update.provider_fee)
            .fetch_one(conn)
            .await
            .map_err(AppError::Database)
    }
}
