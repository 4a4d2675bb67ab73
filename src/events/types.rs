use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CanonicalStatus, CashInTransaction, Withdraw, WithdrawStatus};

/// Topic suffixes, prefixed with `kafka.topic_prefix` at runtime.
pub mod topics {
    pub const LEDGER: &str = "ledger";

    pub fn qualified(prefix: &str, topic: &str) -> String {
        if prefix.is_empty() {
            topic.to_string()
        } else {
            format!("{}.{}", prefix, topic)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CashInStatusChanged,
    WithdrawStatusChanged,
}

/// Envelope wrapping all events with common metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub correlation_id: Option<String>,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: EventType, payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            source: "pix-reconciliation".to_string(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A committed cash-in transition and the balance movement it caused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashInStatusChanged {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub provider: String,
    pub old_status: CanonicalStatus,
    pub new_status: CanonicalStatus,
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub delta_available: Decimal,
    pub delta_blocked: Decimal,
    pub end_to_end_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A committed withdraw transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawStatusChanged {
    pub withdraw_id: Uuid,
    pub account_id: Uuid,
    pub provider: String,
    pub old_status: WithdrawStatus,
    pub new_status: WithdrawStatus,
    pub gross_amount: Decimal,
    pub refunded_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Ledger change published after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerEvent {
    CashIn(EventEnvelope<CashInStatusChanged>),
    Withdraw(EventEnvelope<WithdrawStatusChanged>),
}

impl LedgerEvent {
    pub fn cash_in(
        record: &CashInTransaction,
        old_status: CanonicalStatus,
        delta_available: Decimal,
        delta_blocked: Decimal,
    ) -> Self {
        let payload = CashInStatusChanged {
            transaction_id: record.id,
            account_id: record.account_id,
            provider: record.provider.clone(),
            old_status,
            new_status: record.status,
            gross_amount: record.gross_amount,
            fee_amount: record.fee_amount,
            delta_available,
            delta_blocked,
            end_to_end_id: record.end_to_end_id.clone(),
            occurred_at: record.updated_at,
        };
        LedgerEvent::CashIn(
            EventEnvelope::new(EventType::CashInStatusChanged, payload)
                .with_correlation_id(record.id.to_string()),
        )
    }

    pub fn withdraw(record: &Withdraw, old_status: WithdrawStatus, refunded_amount: Decimal) -> Self {
        let payload = WithdrawStatusChanged {
            withdraw_id: record.id,
            account_id: record.account_id,
            provider: record.provider.clone(),
            old_status,
            new_status: record.status,
            gross_amount: record.gross_amount,
            refunded_amount,
            occurred_at: record.updated_at,
        };
        LedgerEvent::Withdraw(
            EventEnvelope::new(EventType::WithdrawStatusChanged, payload)
                .with_correlation_id(record.id.to_string()),
        )
    }

    /// Partition key: the owning account, so one wallet's events stay ordered.
    pub fn key(&self) -> String {
        match self {
            LedgerEvent::CashIn(e) => e.payload.account_id.to_string(),
            LedgerEvent::Withdraw(e) => e.payload.account_id.to_string(),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            LedgerEvent::CashIn(e) => e.event_type,
            LedgerEvent::Withdraw(e) => e.event_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cash_in_event_from_record() {
        let mut record = CashInTransaction::new(Uuid::new_v4(), "reflowpay", dec!(100));
        record.status = CanonicalStatus::Paga;
        record.fee_amount = dec!(2);

        let event = LedgerEvent::cash_in(&record, CanonicalStatus::Pendente, dec!(98), dec!(0));

        assert_eq!(event.event_type(), EventType::CashInStatusChanged);
        assert_eq!(event.key(), record.account_id.to_string());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "CASH_IN_STATUS_CHANGED");
        assert_eq!(json["source"], "pix-reconciliation");
        assert_eq!(json["payload"]["new_status"], "PAGA");
        assert_eq!(json["correlation_id"], record.id.to_string());
    }

    #[test]
    fn test_withdraw_event_serialization() {
        let mut record = Withdraw::new(Uuid::new_v4(), "podpay", dec!(50), dec!(0), "wd-1");
        record.status = WithdrawStatus::Failed;

        let event = LedgerEvent::withdraw(&record, WithdrawStatus::Processing, dec!(50));
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("WITHDRAW_STATUS_CHANGED"));
        assert!(json.contains("\"old_status\":\"processing\""));
    }

    #[test]
    fn test_qualified_topic() {
        assert_eq!(topics::qualified("pix", topics::LEDGER), "pix.ledger");
        assert_eq!(topics::qualified("", topics::LEDGER), "ledger");
    }
}
