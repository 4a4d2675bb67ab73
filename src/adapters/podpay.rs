//! PodPay wraps everything in `data`, amounts in cents.

use crate::adapters::normalized::{decimal_at, str_at, timestamp_at, NormalizedWebhookEvent, ReferenceCandidates};
use crate::adapters::provider::ProviderKind;
use crate::error::Result;
use crate::models::Direction;
use rust_decimal::Decimal;
use serde_json::Value;

pub(crate) fn parse(flow: Direction, raw: &Value) -> Result<NormalizedWebhookEvent> {
    let mut status = str_at(raw, &["data.status", "status"]).unwrap_or_default();

    // Transfers that bounce keep a non-final status and explain it in the description.
    if flow == Direction::Out {
        let description = str_at(raw, &["data.description", "description"]).unwrap_or_default();
        if description.to_lowercase().starts_with("failed") {
            status = "FAILED".to_string();
        }
    }

    let (name_path, document_path) = match flow {
        Direction::In => ("data.customer.name", "data.customer.document.number"),
        Direction::Out => ("data.recipient.name", "data.recipient.document.number"),
    };

    Ok(NormalizedWebhookEvent {
        provider: ProviderKind::PodPay,
        flow,
        references: ReferenceCandidates {
            external_reference: str_at(raw, &["data.externalRef", "externalRef"]),
            provider_transaction_id: str_at(raw, &["data.id", "objectId"]),
            txid: str_at(raw, &["data.pix.txid"]),
            end_to_end_id: str_at(raw, &["data.pix.end2EndId", "data.endToEndId"]),
        },
        provider_status: status,
        amount: decimal_at(raw, &["data.paidAmount", "data.amount"]).map(|c| c / Decimal::ONE_HUNDRED),
        fee: decimal_at(raw, &["data.fee.fixedAmount", "data.fee"]).map(|c| c / Decimal::ONE_HUNDRED),
        timestamp: timestamp_at(raw, &["data.updatedAt", "data.paidAt"]),
        counterparty_name: str_at(raw, &[name_path]),
        counterparty_document: str_at(raw, &[document_path]),
        raw_payload: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalStatus, WithdrawStatus};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_paid_cash_in() {
        let raw = json!({
            "type": "transaction",
            "data": {
                "id": 98765,
                "externalRef": "dep-1",
                "status": "PAID",
                "amount": 10000,
                "customer": {"name": "Ana", "document": {"number": "12345678909"}},
                "pix": {"end2EndId": "E999"}
            }
        });

        let event = parse(Direction::In, &raw).unwrap();
        assert_eq!(event.references.provider_transaction_id.as_deref(), Some("98765"));
        assert_eq!(event.references.external_reference.as_deref(), Some("dep-1"));
        assert_eq!(event.references.end_to_end_id.as_deref(), Some("E999"));
        assert_eq!(event.amount, Some(dec!(100)));
        assert_eq!(event.counterparty_name.as_deref(), Some("Ana"));
        assert_eq!(event.canonical_status(), CanonicalStatus::Paga);
    }

    #[test]
    fn test_withdraw_statuses() {
        let completed = json!({"data": {"id": "t1", "status": "COMPLETED"}});
        assert_eq!(parse(Direction::Out, &completed).unwrap().withdraw_status(), WithdrawStatus::Paid);

        let processing = json!({"data": {"id": "t1", "status": "PROCESSING"}});
        assert_eq!(
            parse(Direction::Out, &processing).unwrap().withdraw_status(),
            WithdrawStatus::Processing
        );

        let canceled = json!({"data": {"id": "t1", "status": "CANCELED"}});
        assert_eq!(parse(Direction::Out, &canceled).unwrap().withdraw_status(), WithdrawStatus::Canceled);
    }

    #[test]
    fn test_failed_description_overrides_status() {
        let raw = json!({
            "data": {"id": "t2", "status": "PROCESSING", "description": "Failed: invalid pix key"}
        });
        assert_eq!(parse(Direction::Out, &raw).unwrap().withdraw_status(), WithdrawStatus::Failed);

        // Only payouts read the description.
        assert_eq!(
            parse(Direction::In, &raw).unwrap().canonical_status(),
            CanonicalStatus::Pendente
        );
    }
}
