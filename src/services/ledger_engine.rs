//! The single writer of account balances and record footprints.
//!
//! Every status change runs in one database transaction that locks the
//! owning account first and the record second, re-reads the persisted status,
//! consults the state machine, and writes `target - previously applied` to the
//! balances together with the new footprint. Callbacks and Kafka events are
//! only fired once that transaction has committed.

use crate::adapters::NormalizedWebhookEvent;
use crate::config::LedgerSettings;
use crate::error::{AppError, Result};
use crate::events::{EventPublisher, LedgerEvent};
use crate::models::{CanonicalStatus, CashInTransaction, Direction, Withdraw, WithdrawStatus};
use crate::notifier::{CallbackPayload, WebhookNotifier};
use crate::observability::{get_metrics, mask_end_to_end, LatencyTimer};
use crate::repositories::{
    AccountRepository, CashInUpdate, TransactionRepository, WithdrawRepository, WithdrawUpdate,
};
use crate::services::state_machine::{CashInStateMachine, GuardDecision, WithdrawStateMachine};
use crate::services::wallet_policy::{plan_cash_in, plan_withdraw};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Provider data recorded alongside a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEvidence {
    pub provider_status: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub txid: Option<String>,
    pub end_to_end_id: Option<String>,
    /// When the provider says the status changed.
    pub occurred_at: Option<DateTime<Utc>>,
    /// What the provider charged on its side.
    pub provider_fee: Option<Decimal>,
    pub payload: Option<Value>,
}

impl StatusEvidence {
    pub fn new(provider_status: impl Into<String>) -> Self {
        Self {
            provider_status: Some(provider_status.into()),
            ..Self::default()
        }
    }

    /// Everything a normalized webhook can contribute to the record.
    pub fn from_event(event: &NormalizedWebhookEvent) -> Self {
        let refs = &event.references;
        Self {
            provider_status: Some(event.provider_status.clone()),
            provider_transaction_id: refs.provider_transaction_id.clone(),
            txid: refs.txid.clone(),
            end_to_end_id: refs.end_to_end_id.clone(),
            occurred_at: event.timestamp,
            provider_fee: event.fee,
            payload: Some(event.raw_payload.clone()),
        }
    }

    pub fn with_end_to_end_id(mut self, e2e: Option<String>) -> Self {
        self.end_to_end_id = e2e;
        self
    }

    pub fn with_provider_ids(mut self, provider_transaction_id: Option<String>, txid: Option<String>) -> Self {
        self.provider_transaction_id = provider_transaction_id;
        self.txid = txid;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Operator action with no provider payload attached.
    pub fn manual(note: Option<String>) -> Self {
        let mut evidence = Self::new("manual_review");
        evidence.payload = Some(json!({ "source": "manual_review", "note": note }));
        evidence
    }

    /// Withdraws keep a single provider reference; the transaction id wins over the txid.
    fn provider_reference(&self) -> Option<String> {
        self.provider_transaction_id.clone().or_else(|| self.txid.clone())
    }

    fn withdraw_meta(&self) -> Value {
        let mut meta = Map::new();
        if let Some(e2e) = &self.end_to_end_id {
            meta.insert("end_to_end".to_string(), Value::String(e2e.clone()));
        }
        if let Some(status) = &self.provider_status {
            meta.insert("provider_status".to_string(), Value::String(status.clone()));
        }
        if let Some(fee) = self.provider_fee {
            meta.insert("provider_fee".to_string(), json!(fee));
        }
        if let Some(payload) = &self.payload {
            meta.insert("provider_raw".to_string(), payload.clone());
        }
        Value::Object(meta)
    }
}

/// What the engine did with one requested transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Applied {
        previous: String,
        current: String,
        delta_available: Decimal,
        delta_blocked: Decimal,
    },
    /// The guard refused the transition; nothing was written.
    Skipped {
        decision: GuardDecision,
        current: String,
    },
    AccountMissing {
        account_id: Uuid,
    },
}

impl LedgerOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerOutcome::Applied { .. })
    }
}

pub struct LedgerEngine {
    pool: PgPool,
    settings: LedgerSettings,
    notifier: Option<Arc<WebhookNotifier>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl LedgerEngine {
    pub fn new(pool: PgPool, settings: LedgerSettings) -> Self {
        Self {
            pool,
            settings,
            notifier: None,
            publisher: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<WebhookNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Moves a cash-in from `old` to `new`, applying the balance effect once.
    ///
    /// `old` is the status the caller observed. If the persisted status has
    /// moved since, the persisted one wins and the guard is re-evaluated.
    pub async fn apply_status_change(
        &self,
        record: &CashInTransaction,
        old: CanonicalStatus,
        new: CanonicalStatus,
        evidence: &StatusEvidence,
    ) -> Result<LedgerOutcome> {
        self.apply_cash_in(record, old, new, evidence)
            .await
            .map_err(|e| note_lock_timeout("cash_in", e))
    }

    /// Moves a withdraw from `old` to `new`. Only a failure moves money, as a
    /// one-time refund of the gross debited at creation.
    pub async fn apply_withdraw_status_change(
        &self,
        record: &Withdraw,
        old: WithdrawStatus,
        new: WithdrawStatus,
        evidence: &StatusEvidence,
    ) -> Result<LedgerOutcome> {
        self.apply_withdraw(record, old, new, evidence)
            .await
            .map_err(|e| note_lock_timeout("cash_out", e))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.settings.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
        Ok(tx)
    }

    async fn apply_cash_in(
        &self,
        record: &CashInTransaction,
        old: CanonicalStatus,
        new: CanonicalStatus,
        evidence: &StatusEvidence,
    ) -> Result<LedgerOutcome> {
        let write_timer = LatencyTimer::new();
        let mut tx = self.begin().await?;

        let lock_timer = LatencyTimer::new();
        let account = match AccountRepository::lock_for_update(&mut *tx, record.account_id).await? {
            Some(account) => account,
            None => {
                warn!(
                    transaction_id = %record.id,
                    account_id = %record.account_id,
                    "Owning account missing, skipping status change"
                );
                return Ok(LedgerOutcome::AccountMissing {
                    account_id: record.account_id,
                });
            }
        };

        let current = TransactionRepository::lock_by_id(&mut *tx, record.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cash-in '{}' not found", record.id)))?;
        get_metrics().record_lock_wait(lock_timer.elapsed_ms());

        if current.direction != Direction::In || current.account_id != account.id {
            return Err(AppError::ContractViolation(format!(
                "Cash-in '{}' has direction '{}' under account '{}'",
                current.id,
                current.direction.as_str(),
                current.account_id
            )));
        }

        if current.status != old {
            debug!(
                transaction_id = %current.id,
                observed = %old,
                persisted = %current.status,
                "Status moved since lookup, using persisted value"
            );
        }
        let previous = current.status;

        let decision = CashInStateMachine::guard(previous, new);
        if !decision.should_apply() {
            info!(
                transaction_id = %current.id,
                current = %previous,
                proposed = %new,
                decision = ?decision,
                "Cash-in transition not applied"
            );
            return Ok(LedgerOutcome::Skipped {
                decision,
                current: previous.as_str().to_string(),
            });
        }

        let plan = plan_cash_in(
            previous,
            new,
            current.gross_amount,
            current.footprint(),
            &account.fee_config(),
        )?;

        if !plan.is_noop() {
            AccountRepository::apply_balance_delta(
                &mut *tx,
                account.id,
                plan.delta_available,
                plan.delta_blocked,
            )
            .await?;
        }

        let update = CashInUpdate {
            status: new,
            footprint: plan.target,
            fee_amount: plan.fee_amount,
            provider_transaction_id: evidence.provider_transaction_id.clone(),
            txid: evidence.txid.clone(),
            end_to_end_id: evidence.end_to_end_id.clone(),
            provider_fee: evidence.provider_fee,
            occurred_at: evidence.occurred_at,
            payload: evidence.payload.clone(),
        };
        let updated = TransactionRepository::update_reconciled(&mut *tx, current.id, &update).await?;

        tx.commit().await.map_err(AppError::Database)?;

        let metrics = get_metrics();
        metrics.record_ledger_write_latency(write_timer.elapsed_ms());
        metrics.record_balance_delta("available", plan.delta_available);
        metrics.record_balance_delta("blocked", plan.delta_blocked);

        info!(
            transaction_id = %updated.id,
            account_id = %account.id,
            old = %previous,
            new = %new,
            delta_available = %plan.delta_available,
            delta_blocked = %plan.delta_blocked,
            end_to_end = %updated.end_to_end_id.as_deref().map(mask_end_to_end).unwrap_or_default(),
            "Cash-in status applied"
        );

        if new == CanonicalStatus::Paga {
            if let Some((url, secret)) = account.callback() {
                self.notify(url, secret, CallbackPayload::for_cash_in(&updated));
            }
        }
        self.publish(LedgerEvent::cash_in(
            &updated,
            previous,
            plan.delta_available,
            plan.delta_blocked,
        ));

        Ok(LedgerOutcome::Applied {
            previous: previous.as_str().to_string(),
            current: new.as_str().to_string(),
            delta_available: plan.delta_available,
            delta_blocked: plan.delta_blocked,
        })
    }

    async fn apply_withdraw(
        &self,
        record: &Withdraw,
        old: WithdrawStatus,
        new: WithdrawStatus,
        evidence: &StatusEvidence,
    ) -> Result<LedgerOutcome> {
        let write_timer = LatencyTimer::new();
        let mut tx = self.begin().await?;

        let lock_timer = LatencyTimer::new();
        let account = match AccountRepository::lock_for_update(&mut *tx, record.account_id).await? {
            Some(account) => account,
            None => {
                warn!(
                    withdraw_id = %record.id,
                    account_id = %record.account_id,
                    "Owning account missing, skipping withdraw update"
                );
                return Ok(LedgerOutcome::AccountMissing {
                    account_id: record.account_id,
                });
            }
        };

        let current = WithdrawRepository::lock_by_id(&mut *tx, record.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Withdraw '{}' not found", record.id)))?;
        get_metrics().record_lock_wait(lock_timer.elapsed_ms());

        if current.account_id != account.id {
            return Err(AppError::ContractViolation(format!(
                "Withdraw '{}' is not owned by account '{}'",
                current.id, account.id
            )));
        }

        if current.status != old {
            debug!(
                withdraw_id = %current.id,
                observed = old.as_str(),
                persisted = current.status.as_str(),
                "Withdraw status moved since lookup, using persisted value"
            );
        }
        let previous = current.status;

        let decision = WithdrawStateMachine::guard(previous, new);
        if !decision.should_apply() {
            info!(
                withdraw_id = %current.id,
                current = previous.as_str(),
                proposed = new.as_str(),
                decision = ?decision,
                "Withdraw transition not applied"
            );
            return Ok(LedgerOutcome::Skipped {
                decision,
                current: previous.as_str().to_string(),
            });
        }

        let plan = plan_withdraw(new, current.gross_amount, current.is_refunded());
        if plan.refund > Decimal::ZERO {
            AccountRepository::apply_balance_delta(&mut *tx, account.id, plan.refund, Decimal::ZERO)
                .await?;
        }

        let update = WithdrawUpdate {
            status: new,
            mark_refunded: plan.mark_refunded,
            mark_processed: plan.mark_processed,
            provider_reference: evidence.provider_reference(),
            occurred_at: evidence.occurred_at,
            meta_patch: evidence.withdraw_meta(),
        };
        let updated = WithdrawRepository::update_reconciled(&mut *tx, current.id, &update).await?;

        tx.commit().await.map_err(AppError::Database)?;

        let metrics = get_metrics();
        metrics.record_ledger_write_latency(write_timer.elapsed_ms());
        metrics.record_balance_delta("available", plan.refund);

        info!(
            withdraw_id = %updated.id,
            account_id = %account.id,
            old = previous.as_str(),
            new = new.as_str(),
            refund = %plan.refund,
            "Withdraw status applied"
        );

        if new == WithdrawStatus::Paid {
            if let Some((url, secret)) = account.callback() {
                self.notify(url, secret, CallbackPayload::for_withdraw(&updated));
            }
        }
        self.publish(LedgerEvent::withdraw(&updated, previous, plan.refund));

        Ok(LedgerOutcome::Applied {
            previous: previous.as_str().to_string(),
            current: new.as_str().to_string(),
            delta_available: plan.refund,
            delta_blocked: Decimal::ZERO,
        })
    }

    fn notify(&self, url: &str, secret: &str, payload: CallbackPayload) {
        if let Some(notifier) = &self.notifier {
            notifier.dispatch(url.to_string(), secret.to_string(), payload);
        }
    }

    fn publish(&self, event: LedgerEvent) {
        if let Some(publisher) = &self.publisher {
            let publisher = Arc::clone(publisher);
            tokio::spawn(async move {
                if let Err(e) = publisher.publish(&event).await {
                    warn!(error = %e, key = %event.key(), "Failed to publish ledger event");
                }
            });
        }
    }
}

fn note_lock_timeout(flow: &str, err: AppError) -> AppError {
    if matches!(err, AppError::LockTimeout(_)) {
        warn!(flow, error = %err, "Ledger lock not acquired in time");
        get_metrics().record_lock_timeout(flow);
    }
    err
}
