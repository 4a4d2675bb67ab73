//! ReflowPay posts flat JSON with the amount in cents:
//! `{"transactionId", "orderId", "status", "endToEndId", "value"}`.

use crate::adapters::normalized::{decimal_at, str_at, timestamp_at, NormalizedWebhookEvent, ReferenceCandidates};
use crate::adapters::provider::ProviderKind;
use crate::error::Result;
use crate::models::Direction;
use rust_decimal::Decimal;
use serde_json::Value;

pub(crate) fn parse(flow: Direction, raw: &Value) -> Result<NormalizedWebhookEvent> {
    let cents = decimal_at(raw, &["value", "amount"]);

    Ok(NormalizedWebhookEvent {
        provider: ProviderKind::ReflowPay,
        flow,
        references: ReferenceCandidates {
            external_reference: str_at(raw, &["orderId", "externalId"]),
            provider_transaction_id: str_at(raw, &["transactionId", "id"]),
            txid: str_at(raw, &["txid"]),
            end_to_end_id: str_at(raw, &["endToEndId", "e2eId"]),
        },
        provider_status: str_at(raw, &["status"]).unwrap_or_default(),
        amount: cents.map(|c| c / Decimal::ONE_HUNDRED),
        fee: decimal_at(raw, &["fee"]).map(|c| c / Decimal::ONE_HUNDRED),
        timestamp: timestamp_at(raw, &["updatedAt", "paidAt", "createdAt"]),
        counterparty_name: str_at(raw, &["payer.name", "receiver.name"]),
        counterparty_document: str_at(raw, &["payer.document", "receiver.document"]),
        raw_payload: raw.clone(),
    })
}
