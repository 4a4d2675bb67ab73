use crate::models::status::CanonicalStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Money flow of a record relative to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// What a record has already added to its account's balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFootprint {
    pub available: Decimal,
    pub blocked: Decimal,
}

impl WalletFootprint {
    pub const EMPTY: WalletFootprint = WalletFootprint {
        available: Decimal::ZERO,
        blocked: Decimal::ZERO,
    };

    pub fn new(available: Decimal, blocked: Decimal) -> Self {
        Self { available, blocked }
    }

    pub fn has_block(&self) -> bool {
        self.blocked > Decimal::ZERO
    }
}

/// A PIX deposit tracked on behalf of an account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashInTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    pub provider: String,
    /// As reported by the provider, never recomputed.
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub currency: String,
    pub status: CanonicalStatus,
    pub applied_available_amount: Decimal,
    pub applied_blocked_amount: Decimal,
    pub external_reference: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub txid: Option<String>,
    pub end_to_end_id: Option<String>,
    /// Fee the provider reported charging, if any.
    pub provider_fee_amount: Option<Decimal>,
    /// History of raw webhook bodies, oldest first.
    pub provider_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl CashInTransaction {
    /// Creates a pending deposit with an empty footprint.
    pub fn new(account_id: Uuid, provider: impl Into<String>, gross_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            direction: Direction::In,
            provider: provider.into(),
            gross_amount,
            fee_amount: Decimal::ZERO,
            currency: "BRL".to_string(),
            status: CanonicalStatus::Pendente,
            applied_available_amount: Decimal::ZERO,
            applied_blocked_amount: Decimal::ZERO,
            external_reference: None,
            provider_transaction_id: None,
            txid: None,
            end_to_end_id: None,
            provider_fee_amount: None,
            provider_payload: serde_json::Value::Array(Vec::new()),
            created_at: now,
            updated_at: now,
            paid_at: None,
            canceled_at: None,
        }
    }

    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn with_provider_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.provider_transaction_id = Some(id.into());
        self
    }

    pub fn with_txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }

    pub fn with_end_to_end_id(mut self, e2e: impl Into<String>) -> Self {
        self.end_to_end_id = Some(e2e.into());
        self
    }

    pub fn footprint(&self) -> WalletFootprint {
        WalletFootprint::new(self.applied_available_amount, self.applied_blocked_amount)
    }

    /// Net credited on payment, derived from the stored fee.
    pub fn net_amount(&self) -> Decimal {
        self.gross_amount - self.fee_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_cash_in_is_pending_and_untouched() {
        let tx = CashInTransaction::new(Uuid::new_v4(), "reflowpay", dec!(100.00))
            .with_external_reference("order-1");

        assert_eq!(tx.direction, Direction::In);
        assert_eq!(tx.status, CanonicalStatus::Pendente);
        assert_eq!(tx.footprint(), WalletFootprint::EMPTY);
        assert_eq!(tx.external_reference.as_deref(), Some("order-1"));
        assert_eq!(tx.provider_payload, serde_json::json!([]));
    }

    #[test]
    fn test_footprint_block_detection() {
        assert!(!WalletFootprint::EMPTY.has_block());
        assert!(WalletFootprint::new(dec!(0), dec!(10)).has_block());
    }
}
