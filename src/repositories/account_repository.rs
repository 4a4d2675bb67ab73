use crate::error::{AppError, Result};
use crate::models::{Account, AccountBalances};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for wallet accounts.
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new account in the database.
    pub async fn create(&self, account: &Account) -> Result<Account> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, name, available_balance, retained_balance, blocked_balance, fee_enabled, fee_mode, fee_fixed_amount, fee_percentage, review_threshold, webhook_url, webhook_secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id, name, available_balance, retained_balance, blocked_balance, fee_enabled, fee_mode, fee_fixed_amount, fee_percentage, review_threshold, webhook_url, webhook_secret, created_at, updated_at
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(account.available_balance)
        .bind(account.retained_balance)
        .bind(account.blocked_balance)
        .bind(account.fee_enabled)
        .bind(account.fee_mode)
        .bind(account.fee_fixed_amount)
        .bind(account.fee_percentage)
        .bind(account.review_threshold)
        .bind(&account.webhook_url)
        .bind(&account.webhook_secret)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds an account by its UUID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, available_balance, retained_balance, blocked_balance, fee_enabled, fee_mode, fee_fixed_amount, fee_percentage, review_threshold, webhook_url, webhook_secret, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Takes the exclusive row lock on an account for the rest of the
    /// surrounding transaction.
    pub async fn lock_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, available_balance, retained_balance, blocked_balance, fee_enabled, fee_mode, fee_fixed_amount, fee_percentage, review_threshold, webhook_url, webhook_secret, created_at, updated_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::from_lock_error)
    }

    /// Adds signed deltas to the balance buckets. Caller must hold the row lock.
    pub async fn apply_balance_delta(
        conn: &mut PgConnection,
        id: Uuid,
        delta_available: Decimal,
        delta_blocked: Decimal,
    ) -> Result<AccountBalances> {
        sqlx::query_as::<_, AccountBalances>(
            r#"
            UPDATE accounts
            SET available_balance = available_balance + $2,
                blocked_balance = blocked_balance + $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING available_balance, blocked_balance
            "#,
        )
        .bind(id)
        .bind(delta_available)
        .bind(delta_blocked)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)
    }

    /// Reads current balances without locking.
    pub async fn balances(&self, id: Uuid) -> Result<Option<AccountBalances>> {
        let row = sqlx::query_as::<_, AccountBalances>(
            r#"
            SELECT available_balance, blocked_balance
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
