//! Webhook pipeline: finder, guard, review routing, then the ledger engine.

use crate::adapters::NormalizedWebhookEvent;
use crate::config::FinderSettings;
use crate::error::{AppError, Result};
use crate::models::{CanonicalStatus, Direction};
use crate::observability::{get_metrics, mask_document, mask_end_to_end, mask_sensitive};
use crate::repositories::{AccountRepository, TransactionRepository};
use crate::services::ledger_engine::{LedgerEngine, LedgerOutcome, StatusEvidence};
use crate::services::state_machine::{CashInStateMachine, GuardDecision, WithdrawStateMachine};
use crate::services::transaction_finder::{MatchedBy, TransactionFinder};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of one webhook. Everything except `Applied` is a normal no-op.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Applied {
        record_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        matched_by: Option<MatchedBy>,
        previous: String,
        current: String,
        delta_available: Decimal,
        delta_blocked: Decimal,
    },
    Duplicate {
        record_id: Uuid,
        status: String,
    },
    Ignored {
        #[serde(skip_serializing_if = "Option::is_none")]
        record_id: Option<Uuid>,
        reason: String,
    },
    NotFound,
}

impl ReconciliationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Applied { .. } => "applied",
            ReconciliationOutcome::Duplicate { .. } => "duplicate",
            ReconciliationOutcome::Ignored { .. } => "ignored",
            ReconciliationOutcome::NotFound => "not_found",
        }
    }

    fn ignored(record_id: Option<Uuid>, reason: impl Into<String>) -> Self {
        ReconciliationOutcome::Ignored {
            record_id,
            reason: reason.into(),
        }
    }

    fn skipped(record_id: Uuid, decision: GuardDecision, current: String) -> Self {
        match decision {
            GuardDecision::Duplicate => ReconciliationOutcome::Duplicate {
                record_id,
                status: current,
            },
            GuardDecision::Terminal => Self::ignored(Some(record_id), "terminal_state"),
            GuardDecision::Regression => Self::ignored(Some(record_id), "status_regression"),
            GuardDecision::Proceed => Self::ignored(Some(record_id), "not_applied"),
        }
    }

    fn from_ledger(record_id: Uuid, matched_by: Option<MatchedBy>, outcome: LedgerOutcome) -> Self {
        match outcome {
            LedgerOutcome::Applied {
                previous,
                current,
                delta_available,
                delta_blocked,
            } => ReconciliationOutcome::Applied {
                record_id,
                matched_by,
                previous,
                current,
                delta_available,
                delta_blocked,
            },
            LedgerOutcome::Skipped { decision, current } => Self::skipped(record_id, decision, current),
            LedgerOutcome::AccountMissing { .. } => Self::ignored(Some(record_id), "account_missing"),
        }
    }
}

pub struct ReconciliationService {
    engine: Arc<LedgerEngine>,
    finder: TransactionFinder,
    transactions: TransactionRepository,
    accounts: AccountRepository,
    /// Lowercase provider name to review threshold.
    review_thresholds: HashMap<String, Decimal>,
}

impl ReconciliationService {
    pub fn new(
        pool: PgPool,
        engine: Arc<LedgerEngine>,
        finder_settings: FinderSettings,
        review_thresholds: HashMap<String, Decimal>,
    ) -> Self {
        Self {
            engine,
            finder: TransactionFinder::new(pool.clone(), finder_settings),
            transactions: TransactionRepository::new(pool.clone()),
            accounts: AccountRepository::new(pool),
            review_thresholds,
        }
    }

    /// Runs one normalized webhook through the pipeline.
    pub async fn handle_event(&self, event: &NormalizedWebhookEvent) -> Result<ReconciliationOutcome> {
        let flow = match event.flow {
            Direction::In => "cash_in",
            Direction::Out => "cash_out",
        };
        let metrics = get_metrics();
        metrics.record_webhook_received(event.provider.as_str(), flow);
        info!(
            provider = %event.provider,
            flow = flow,
            status = %event.provider_status,
            amount = ?event.amount,
            fee = ?event.fee,
            occurred_at = ?event.timestamp,
            counterparty = %event.counterparty_name.as_deref().map(|n| mask_sensitive(n, 2)).unwrap_or_default(),
            counterparty_document = %event.counterparty_document.as_deref().map(mask_document).unwrap_or_default(),
            "Webhook received"
        );

        let outcome = match event.flow {
            Direction::In => self.handle_cash_in(event).await,
            Direction::Out => self.handle_cash_out(event).await,
        };

        match &outcome {
            Ok(result) => metrics.record_reconciliation(flow, result.label()),
            Err(_) => metrics.record_reconciliation(flow, "error"),
        }
        outcome
    }

    pub async fn handle_cash_in(&self, event: &NormalizedWebhookEvent) -> Result<ReconciliationOutcome> {
        if event.is_informational() {
            info!(provider = %event.provider, status = %event.provider_status, "Informational cash-in status ignored");
            return Ok(ReconciliationOutcome::ignored(None, "informational_status"));
        }

        let Some(found) = self.finder.find_cash_in(event).await? else {
            log_not_found(event);
            return Ok(ReconciliationOutcome::NotFound);
        };
        let record = found.record;

        let mut new = event.canonical_status();
        // A replayed "paid" on a credited record must stay a duplicate, not an escalation.
        if new == CanonicalStatus::Paga && record.status != CanonicalStatus::Paga {
            let threshold = self.effective_threshold(record.account_id, event.provider.as_str()).await?;
            let routed = route_for_review(new, record.gross_amount, threshold);
            if routed != new {
                info!(
                    transaction_id = %record.id,
                    gross = %record.gross_amount,
                    threshold = ?threshold,
                    "Paid cash-in above review threshold, holding for review"
                );
                new = routed;
            }
        }

        let decision = CashInStateMachine::guard(record.status, new);
        if !decision.should_apply() {
            info!(
                transaction_id = %record.id,
                current = %record.status,
                proposed = %new,
                decision = ?decision,
                "Cash-in webhook short-circuited"
            );
            return Ok(ReconciliationOutcome::skipped(
                record.id,
                decision,
                record.status.as_str().to_string(),
            ));
        }

        let evidence = StatusEvidence::from_event(event);

        match self
            .engine
            .apply_status_change(&record, record.status, new, &evidence)
            .await
        {
            Ok(outcome) => Ok(ReconciliationOutcome::from_ledger(record.id, Some(found.matched_by), outcome)),
            Err(AppError::FeeConfiguration(reason)) => {
                error!(
                    transaction_id = %record.id,
                    account_id = %record.account_id,
                    reason = %reason,
                    "Account fee configuration rejected, cash-in left unchanged"
                );
                Ok(ReconciliationOutcome::ignored(Some(record.id), "fee_configuration"))
            }
            Err(AppError::NotFound(_)) => Ok(ReconciliationOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn handle_cash_out(&self, event: &NormalizedWebhookEvent) -> Result<ReconciliationOutcome> {
        if event.is_informational() {
            info!(provider = %event.provider, status = %event.provider_status, "Informational withdraw status ignored");
            return Ok(ReconciliationOutcome::ignored(None, "informational_status"));
        }

        let Some(found) = self.finder.find_withdraw(event).await? else {
            log_not_found(event);
            return Ok(ReconciliationOutcome::NotFound);
        };
        let record = found.record;
        let new = event.withdraw_status();

        let decision = WithdrawStateMachine::guard(record.status, new);
        if !decision.should_apply() {
            info!(
                withdraw_id = %record.id,
                current = record.status.as_str(),
                proposed = new.as_str(),
                decision = ?decision,
                "Withdraw webhook short-circuited"
            );
            return Ok(ReconciliationOutcome::skipped(
                record.id,
                decision,
                record.status.as_str().to_string(),
            ));
        }

        let evidence = StatusEvidence::from_event(event);

        match self
            .engine
            .apply_withdraw_status_change(&record, record.status, new, &evidence)
            .await
        {
            Ok(outcome) => Ok(ReconciliationOutcome::from_ledger(record.id, Some(found.matched_by), outcome)),
            Err(AppError::NotFound(_)) => Ok(ReconciliationOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Operator decision on a held cash-in, or escalation of a paid one.
    pub async fn resolve_review(
        &self,
        transaction_id: Uuid,
        target: CanonicalStatus,
        note: Option<String>,
    ) -> Result<ReconciliationOutcome> {
        let record = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cash-in '{}' not found", transaction_id)))?;

        let allowed = match record.status {
            CanonicalStatus::Med => target != CanonicalStatus::Med,
            CanonicalStatus::Paga => target == CanonicalStatus::Med,
            _ => false,
        };
        if !allowed {
            return Err(AppError::Validation(format!(
                "Cash-in '{}' in {} cannot be resolved to {}",
                record.id, record.status, target
            )));
        }

        warn!(
            transaction_id = %record.id,
            from = %record.status,
            to = %target,
            "Manual review decision"
        );

        let outcome = self
            .engine
            .apply_status_change(&record, record.status, target, &StatusEvidence::manual(note))
            .await?;
        Ok(ReconciliationOutcome::from_ledger(record.id, None, outcome))
    }

    /// Account threshold wins over the provider default.
    async fn effective_threshold(&self, account_id: Uuid, provider: &str) -> Result<Option<Decimal>> {
        let account_threshold = self
            .accounts
            .find_by_id(account_id)
            .await?
            .and_then(|account| account.review_threshold);

        Ok(account_threshold.or_else(|| self.review_thresholds.get(provider).copied()))
    }
}

/// Holds a paid cash-in for review when its gross exceeds the threshold.
pub fn route_for_review(
    status: CanonicalStatus,
    gross: Decimal,
    threshold: Option<Decimal>,
) -> CanonicalStatus {
    match threshold {
        Some(limit) if status == CanonicalStatus::Paga && gross > limit => CanonicalStatus::Med,
        _ => status,
    }
}

fn log_not_found(event: &NormalizedWebhookEvent) {
    let refs = &event.references;
    info!(
        provider = %event.provider,
        flow = event.flow.as_str(),
        external_reference = ?refs.external_reference,
        provider_transaction_id = ?refs.provider_transaction_id,
        txid = ?refs.txid,
        end_to_end = %refs.end_to_end_id.as_deref().map(mask_end_to_end).unwrap_or_default(),
        "No record for webhook, acknowledging"
    );
}
