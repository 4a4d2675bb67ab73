use crate::models::status::WithdrawStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A PIX payout. The gross amount leaves `available_balance` when the
/// withdraw is created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdraw {
    pub id: Uuid,
    pub account_id: Uuid,
    pub provider: String,
    pub net_amount: Decimal,
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub currency: String,
    pub status: WithdrawStatus,
    pub provider_reference: Option<String>,
    pub idempotency_key: String,
    /// Correlation data: `end_to_end`, `provider_status`, `provider_raw`.
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Set once the debit has been given back.
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Withdraw {
    pub fn new(
        account_id: Uuid,
        provider: impl Into<String>,
        gross_amount: Decimal,
        fee_amount: Decimal,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            provider: provider.into(),
            net_amount: gross_amount - fee_amount,
            gross_amount,
            fee_amount,
            currency: "BRL".to_string(),
            status: WithdrawStatus::Pending,
            provider_reference: None,
            idempotency_key: idempotency_key.into(),
            meta: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            processed_at: None,
            refunded_at: None,
        }
    }

    pub fn with_provider_reference(mut self, reference: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }

    pub fn with_end_to_end(mut self, e2e: impl Into<String>) -> Self {
        self.meta["end_to_end"] = serde_json::Value::String(e2e.into());
        self
    }

    pub fn is_refunded(&self) -> bool {
        self.refunded_at.is_some()
    }

    pub fn end_to_end(&self) -> Option<&str> {
        self.meta.get("end_to_end").and_then(|v| v.as_str())
    }
}
