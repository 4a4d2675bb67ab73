//! Veltrax sends decimal amounts and uses one endpoint for both flows, so
//! the flow has to be read off the payload itself.

use crate::adapters::normalized::{decimal_at, str_at, timestamp_at, NormalizedWebhookEvent, ReferenceCandidates};
use crate::adapters::provider::ProviderKind;
use crate::error::Result;
use crate::models::Direction;
use serde_json::Value;

const OUT_TYPES: &[&str] = &["withdraw", "payout", "cashout", "cash_out", "transfer"];
const IN_TYPES: &[&str] = &["deposit", "pixin", "cashin", "cash_in", "payment"];

pub(crate) fn parse(flow: Direction, raw: &Value) -> Result<NormalizedWebhookEvent> {
    let (name_paths, document_paths): (&[&str], &[&str]) = match flow {
        Direction::In => (
            &["payer.name", "nome_pagador"],
            &["payer.document", "cpf_pagador"],
        ),
        Direction::Out => (
            &["payee.name", "nome_recebedor"],
            &["payee.document", "cpf_recebedor"],
        ),
    };

    Ok(NormalizedWebhookEvent {
        provider: ProviderKind::Veltrax,
        flow,
        references: ReferenceCandidates {
            external_reference: str_at(raw, &["external_id", "reference", "idempotency_key"]),
            provider_transaction_id: str_at(raw, &["transaction_id", "transaction"]),
            txid: str_at(raw, &["txid"]),
            end_to_end_id: str_at(raw, &["end_to_end", "e2e", "endToEndId"]),
        },
        provider_status: str_at(raw, &["status"]).unwrap_or_default(),
        amount: decimal_at(raw, &["amount"]),
        fee: decimal_at(raw, &["fee"]),
        timestamp: timestamp_at(raw, &["updated_at", "paid_at", "date"]),
        counterparty_name: str_at(raw, name_paths),
        counterparty_document: str_at(raw, document_paths),
        raw_payload: raw.clone(),
    })
}

/// Explicit type or direction wins; otherwise a payee without a payer means a payout.
pub(crate) fn infer_flow(raw: &Value) -> Direction {
    if let Some(kind) = str_at(raw, &["type", "transaction_type"]) {
        let kind = kind.to_lowercase();
        if OUT_TYPES.contains(&kind.as_str()) {
            return Direction::Out;
        }
        if IN_TYPES.contains(&kind.as_str()) {
            return Direction::In;
        }
    }

    if let Some(direction) = str_at(raw, &["direction"]) {
        match direction.to_lowercase().as_str() {
            "out" | "outbound" | "debit" => return Direction::Out,
            "in" | "inbound" | "credit" => return Direction::In,
            _ => {}
        }
    }

    let has_payee = raw.get("payee").is_some() || raw.get("nome_recebedor").is_some();
    let has_payer = raw.get("payer").is_some() || raw.get("nome_pagador").is_some();
    if has_payee && !has_payer {
        Direction::Out
    } else {
        Direction::In
    }
}
