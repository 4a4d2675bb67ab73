use crate::adapters::NormalizedWebhookEvent;
use crate::config::FinderSettings;
use crate::error::Result;
use crate::models::{CashInTransaction, Withdraw};
use crate::observability::get_metrics;
use crate::repositories::{CashInReference, TransactionRepository, WithdrawReference, WithdrawRepository};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};

/// Fetching two rows is enough to tell a unique heuristic match from an ambiguous one.
const HEURISTIC_FETCH_LIMIT: i64 = 2;

/// Which identifier resolved the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    ExternalReference,
    ProviderTransactionId,
    Txid,
    EndToEndId,
    /// Amount and time window only. Never an exact identity.
    AmountWindow,
}

impl MatchedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedBy::ExternalReference => "external_reference",
            MatchedBy::ProviderTransactionId => "provider_transaction_id",
            MatchedBy::Txid => "txid",
            MatchedBy::EndToEndId => "end_to_end_id",
            MatchedBy::AmountWindow => "amount_window",
        }
    }

    pub fn is_heuristic(&self) -> bool {
        matches!(self, MatchedBy::AmountWindow)
    }
}

#[derive(Debug, Clone)]
pub struct FoundRecord<T> {
    pub record: T,
    pub matched_by: MatchedBy,
}

/// Resolves webhook references to stored records, most reliable identifier first.
pub struct TransactionFinder {
    transactions: TransactionRepository,
    withdraws: WithdrawRepository,
    settings: FinderSettings,
}

impl TransactionFinder {
    pub fn new(pool: PgPool, settings: FinderSettings) -> Self {
        Self {
            transactions: TransactionRepository::new(pool.clone()),
            withdraws: WithdrawRepository::new(pool),
            settings,
        }
    }

    pub async fn find_cash_in(
        &self,
        event: &NormalizedWebhookEvent,
    ) -> Result<Option<FoundRecord<CashInTransaction>>> {
        let refs = &event.references;
        let tiers = [
            (MatchedBy::ExternalReference, CashInReference::ExternalReference, &refs.external_reference),
            (MatchedBy::ProviderTransactionId, CashInReference::ProviderTransactionId, &refs.provider_transaction_id),
            (MatchedBy::Txid, CashInReference::Txid, &refs.txid),
            (MatchedBy::EndToEndId, CashInReference::EndToEndId, &refs.end_to_end_id),
        ];

        for (matched_by, column, value) in tiers {
            let Some(value) = value.as_deref() else { continue };
            if let Some(record) = self.transactions.find_by_reference(column, value).await? {
                return Ok(Some(found("cash_in", record, matched_by)));
            }
        }

        let Some(amount) = event.amount else {
            return Ok(None);
        };
        let (min, max) = amount_bounds(amount, self.settings.amount_tolerance);
        let since = Utc::now() - Duration::hours(self.settings.heuristic_window_hours);
        let candidates = self
            .transactions
            .find_open_by_amount(min, max, since, Some(event.provider.as_str()), HEURISTIC_FETCH_LIMIT)
            .await?;

        Ok(self.accept_heuristic("cash_in", event, candidates))
    }

    pub async fn find_withdraw(
        &self,
        event: &NormalizedWebhookEvent,
    ) -> Result<Option<FoundRecord<Withdraw>>> {
        let refs = &event.references;
        let tiers = [
            (MatchedBy::ExternalReference, WithdrawReference::IdempotencyKey, &refs.external_reference),
            (MatchedBy::ProviderTransactionId, WithdrawReference::ProviderReference, &refs.provider_transaction_id),
            (MatchedBy::Txid, WithdrawReference::ProviderReference, &refs.txid),
            (MatchedBy::EndToEndId, WithdrawReference::EndToEnd, &refs.end_to_end_id),
        ];

        for (matched_by, column, value) in tiers {
            let Some(value) = value.as_deref() else { continue };
            if let Some(record) = self.withdraws.find_by_reference(column, value).await? {
                return Ok(Some(found("cash_out", record, matched_by)));
            }
        }

        let Some(amount) = event.amount else {
            return Ok(None);
        };
        let (min, max) = amount_bounds(amount, self.settings.amount_tolerance);
        let since = Utc::now() - Duration::hours(self.settings.heuristic_window_hours);
        let candidates = self
            .withdraws
            .find_open_by_amount(min, max, since, Some(event.provider.as_str()), HEURISTIC_FETCH_LIMIT)
            .await?;

        Ok(self.accept_heuristic("cash_out", event, candidates))
    }

    fn accept_heuristic<T>(
        &self,
        flow: &str,
        event: &NormalizedWebhookEvent,
        candidates: Vec<T>,
    ) -> Option<FoundRecord<T>> {
        let count = candidates.len();
        match single_candidate(candidates) {
            Some(record) => {
                warn!(
                    flow,
                    provider = %event.provider,
                    amount = ?event.amount,
                    "Record resolved by amount window only"
                );
                Some(found(flow, record, MatchedBy::AmountWindow))
            }
            None if count > 1 => {
                warn!(
                    flow,
                    provider = %event.provider,
                    amount = ?event.amount,
                    "Ambiguous amount window match, treating as not found"
                );
                None
            }
            None => {
                debug!(flow, provider = %event.provider, "No record matched webhook references");
                None
            }
        }
    }
}

fn found<T>(flow: &str, record: T, matched_by: MatchedBy) -> FoundRecord<T> {
    get_metrics().record_finder_match(flow, matched_by.as_str());
    FoundRecord { record, matched_by }
}

/// Inclusive amount range around `amount`, never below zero.
pub fn amount_bounds(amount: Decimal, tolerance: Decimal) -> (Decimal, Decimal) {
    let tolerance = tolerance.abs();
    ((amount - tolerance).max(Decimal::ZERO), amount + tolerance)
}

/// The heuristic tier only trusts a lone candidate.
pub fn single_candidate<T>(mut candidates: Vec<T>) -> Option<T> {
    if candidates.len() == 1 {
        candidates.pop()
    } else {
        None
    }
}
