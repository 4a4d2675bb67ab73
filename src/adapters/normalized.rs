use crate::adapters::provider::ProviderKind;
use crate::models::{CanonicalStatus, Direction, WithdrawStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Identifiers a webhook carries, in the finder's order of reliability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCandidates {
    /// Our own id echoed back (order id, idempotency key).
    pub external_reference: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub txid: Option<String>,
    pub end_to_end_id: Option<String>,
}

impl ReferenceCandidates {
    pub fn is_empty(&self) -> bool {
        self.external_reference.is_none()
            && self.provider_transaction_id.is_none()
            && self.txid.is_none()
            && self.end_to_end_id.is_none()
    }
}

/// Provider-independent view of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWebhookEvent {
    pub provider: ProviderKind,
    pub flow: Direction,
    pub references: ReferenceCandidates,
    /// Raw status word, before canonical mapping.
    pub provider_status: String,
    pub amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
    pub counterparty_name: Option<String>,
    pub counterparty_document: Option<String>,
    pub raw_payload: Value,
}

impl NormalizedWebhookEvent {
    pub fn canonical_status(&self) -> CanonicalStatus {
        CanonicalStatus::normalize(&self.provider_status)
    }

    pub fn withdraw_status(&self) -> WithdrawStatus {
        WithdrawStatus::normalize(&self.provider_status)
    }

    /// Intake statuses that carry no information about the payment.
    pub fn is_informational(&self) -> bool {
        matches!(
            self.provider_status.trim().to_lowercase().as_str(),
            "created" | "initiated" | "new"
        )
    }
}

/// Reads the first non-empty string (or number) at any of the dotted paths.
pub(crate) fn str_at(raw: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| {
        match lookup(raw, path)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// Reads a decimal given either as a JSON number or a numeric string.
pub(crate) fn decimal_at(raw: &Value, paths: &[&str]) -> Option<Decimal> {
    paths.iter().find_map(|path| match lookup(raw, path)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

pub(crate) fn timestamp_at(raw: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    str_at(raw, paths)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |node, key| node.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_str_at_walks_paths_in_order() {
        let raw = json!({"data": {"id": "abc", "n": 42}, "ref": "  "});
        assert_eq!(str_at(&raw, &["ref", "data.id"]), Some("abc".to_string()));
        assert_eq!(str_at(&raw, &["data.n"]), Some("42".to_string()));
        assert_eq!(str_at(&raw, &["missing.path"]), None);
    }

    #[test]
    fn test_decimal_at_accepts_numbers_and_strings() {
        let raw = json!({"a": 10.5, "b": "7.25", "c": "x", "d": 1500});
        assert_eq!(decimal_at(&raw, &["a"]), Some(dec!(10.5)));
        assert_eq!(decimal_at(&raw, &["b"]), Some(dec!(7.25)));
        assert_eq!(decimal_at(&raw, &["c"]), None);
        assert_eq!(decimal_at(&raw, &["d"]), Some(dec!(1500)));
    }

    #[test]
    fn test_timestamp_at() {
        let raw = json!({"updated_at": "2024-05-01T12:00:00-03:00"});
        let ts = timestamp_at(&raw, &["updated_at"]).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T15:00:00+00:00");
    }

    #[test]
    fn test_empty_candidates() {
        assert!(ReferenceCandidates::default().is_empty());
        let refs = ReferenceCandidates {
            txid: Some("t".to_string()),
            ..Default::default()
        };
        assert!(!refs.is_empty());
    }
}
