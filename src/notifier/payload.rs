use crate::models::{CashInTransaction, Direction, Withdraw};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_TYPE: &str = "pix.transaction.update";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackTimestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Body of the signed merchant callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub direction: Direction,
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e2e_id: Option<String>,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub timestamps: CallbackTimestamps,
}

impl CallbackPayload {
    pub fn for_cash_in(tx: &CashInTransaction) -> Self {
        Self {
            event_type: EVENT_TYPE.to_string(),
            direction: Direction::In,
            transaction_id: tx.id,
            external_reference: tx.external_reference.clone(),
            txid: tx.txid.clone(),
            e2e_id: tx.end_to_end_id.clone(),
            amount: tx.gross_amount,
            fee: tx.fee_amount,
            net_amount: tx.net_amount(),
            currency: tx.currency.clone(),
            status: tx.status.as_str().to_lowercase(),
            timestamps: CallbackTimestamps {
                created_at: Some(tx.created_at),
                updated_at: Some(tx.updated_at),
                paid_at: tx.paid_at,
                canceled_at: tx.canceled_at,
                processed_at: None,
            },
        }
    }

    pub fn for_withdraw(w: &Withdraw) -> Self {
        Self {
            event_type: EVENT_TYPE.to_string(),
            direction: Direction::Out,
            transaction_id: w.id,
            external_reference: Some(w.idempotency_key.clone()),
            txid: w.provider_reference.clone(),
            e2e_id: w.end_to_end().map(str::to_string),
            amount: w.gross_amount,
            fee: w.fee_amount,
            net_amount: w.net_amount,
            currency: w.currency.clone(),
            status: w.status.as_str().to_string(),
            timestamps: CallbackTimestamps {
                created_at: Some(w.created_at),
                updated_at: Some(w.updated_at),
                paid_at: None,
                canceled_at: None,
                processed_at: w.processed_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalStatus, WithdrawStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn test_cash_in_payload() {
        let mut tx = CashInTransaction::new(Uuid::new_v4(), "veltrax", dec!(100.00))
            .with_external_reference("order-9")
            .with_end_to_end_id("E0001");
        tx.status = CanonicalStatus::Paga;
        tx.fee_amount = dec!(2.00);
        tx.paid_at = Some(Utc::now());

        let payload = CallbackPayload::for_cash_in(&tx);
        assert_eq!(payload.net_amount, dec!(98.00));
        assert_eq!(payload.status, "paga");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "pix.transaction.update");
        assert_eq!(json["direction"], "in");
        assert_eq!(json["e2e_id"], "E0001");
        assert!(json.get("txid").is_none());
        assert!(json["timestamps"].get("processed_at").is_none());
    }

    #[test]
    fn test_withdraw_payload() {
        let mut w = Withdraw::new(Uuid::new_v4(), "podpay", dec!(50), dec!(1), "wd-7")
            .with_provider_reference("pp-7");
        w.status = WithdrawStatus::Paid;

        let json = serde_json::to_value(CallbackPayload::for_withdraw(&w)).unwrap();
        assert_eq!(json["direction"], "out");
        assert_eq!(json["external_reference"], "wd-7");
        assert_eq!(json["txid"], "pp-7");
        assert_eq!(json["status"], "paid");
    }
}
