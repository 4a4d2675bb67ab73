mod common;

use chrono::{TimeZone, Utc};
use pix_reconciliation::config::LedgerSettings;
use pix_reconciliation::error::AppError;
use pix_reconciliation::models::{AccountFeeConfig, CanonicalStatus, CashInTransaction, Direction, WithdrawStatus};
use pix_reconciliation::repositories::TransactionRepository;
use pix_reconciliation::services::{GuardDecision, LedgerEngine, LedgerOutcome, StatusEvidence};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use CanonicalStatus::*;

fn evidence() -> StatusEvidence {
    StatusEvidence::new("test")
}

#[tokio::test]
async fn test_paid_twice_credits_once() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "reflowpay", dec!(100.00)).await;
    let engine = common::ledger_engine(&pool);

    let first = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap();
    assert!(first.is_applied());

    // Same stale record, same transition: the persisted status wins.
    let second = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap();
    assert_eq!(
        second,
        LedgerOutcome::Skipped {
            decision: GuardDecision::Duplicate,
            current: "PAGA".to_string()
        }
    );

    let balances = common::balances(&pool, account.id).await;
    assert_eq!(balances.available_balance, dec!(100.00));
    assert_eq!(balances.blocked_balance, Decimal::ZERO);

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.status, Paga);
    assert_eq!(stored.applied_available_amount, dec!(100.00));
    assert!(stored.paid_at.is_some());
}

#[tokio::test]
async fn test_review_round_trip_restores_balances() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "podpay", dec!(100.00)).await;
    let engine = common::ledger_engine(&pool);

    engine.apply_status_change(&tx, Pendente, Med, &evidence()).await.unwrap();
    let held = common::balances(&pool, account.id).await;
    assert_eq!(held.blocked_balance, dec!(100.00));
    assert_eq!(held.available_balance, Decimal::ZERO);

    let tx = common::reload_cash_in(&pool, tx.id).await;
    engine.apply_status_change(&tx, Med, Pendente, &evidence()).await.unwrap();

    let released = common::balances(&pool, account.id).await;
    assert_eq!(released.blocked_balance, Decimal::ZERO);
    assert_eq!(released.available_balance, Decimal::ZERO);

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.applied_blocked_amount, Decimal::ZERO);
    assert_eq!(stored.status, Pendente);
}

#[tokio::test]
async fn test_review_then_paid_credits_net() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::percentage(dec!(2))).await;
    let tx = common::create_cash_in(&pool, account.id, "veltrax", dec!(100.00)).await;
    let engine = common::ledger_engine(&pool);

    engine.apply_status_change(&tx, Pendente, Med, &evidence()).await.unwrap();
    assert_eq!(common::balances(&pool, account.id).await.blocked_balance, dec!(100.00));

    let tx = common::reload_cash_in(&pool, tx.id).await;
    let outcome = engine.apply_status_change(&tx, Med, Paga, &evidence()).await.unwrap();
    assert_eq!(
        outcome,
        LedgerOutcome::Applied {
            previous: "MED".to_string(),
            current: "PAGA".to_string(),
            delta_available: dec!(98.00),
            delta_blocked: dec!(-100.00),
        }
    );

    let balances = common::balances(&pool, account.id).await;
    assert_eq!(balances.available_balance, dec!(98.00));
    assert_eq!(balances.blocked_balance, Decimal::ZERO);

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.fee_amount, dec!(2.00));
    assert_eq!(stored.net_amount(), dec!(98.00));
}

#[tokio::test]
async fn test_paid_then_review_moves_gross_into_hold() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::percentage(dec!(2))).await;
    let tx = common::create_cash_in(&pool, account.id, "podpay", dec!(100.00)).await;
    let engine = common::ledger_engine(&pool);

    engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap();
    let tx = common::reload_cash_in(&pool, tx.id).await;
    engine.apply_status_change(&tx, Paga, Med, &evidence()).await.unwrap();

    let balances = common::balances(&pool, account.id).await;
    assert_eq!(balances.available_balance, dec!(-2.00));
    assert_eq!(balances.blocked_balance, dec!(100.00));

    // Re-entering MED keeps the existing hold.
    let tx = common::reload_cash_in(&pool, tx.id).await;
    let replay = engine.apply_status_change(&tx, Med, Med, &evidence()).await.unwrap();
    assert!(!replay.is_applied());
    assert_eq!(common::balances(&pool, account.id).await.blocked_balance, dec!(100.00));
}

#[tokio::test]
async fn test_failed_is_terminal() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "reflowpay", dec!(40.00)).await;
    let engine = common::ledger_engine(&pool);

    engine.apply_status_change(&tx, Pendente, Falha, &evidence()).await.unwrap();
    let outcome = engine.apply_status_change(&tx, Falha, Paga, &evidence()).await.unwrap();

    assert!(matches!(
        outcome,
        LedgerOutcome::Skipped {
            decision: GuardDecision::Terminal,
            ..
        }
    ));
    assert_eq!(common::balances(&pool, account.id).await.available_balance, Decimal::ZERO);

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.status, Falha);
    assert!(stored.canceled_at.is_some());
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
async fn test_review_then_failed_keeps_hold() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "podpay", dec!(75.50)).await;
    let engine = common::ledger_engine(&pool);

    engine.apply_status_change(&tx, Pendente, Med, &evidence()).await.unwrap();
    let tx = common::reload_cash_in(&pool, tx.id).await;
    engine.apply_status_change(&tx, Med, Falha, &evidence()).await.unwrap();

    let balances = common::balances(&pool, account.id).await;
    assert_eq!(balances.blocked_balance, dec!(75.50));
    assert_eq!(balances.available_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_concurrent_deliveries_apply_once() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "veltrax", dec!(100.00)).await;
    let engine = Arc::new(common::ledger_engine(&pool));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            engine.apply_status_change(&tx, Pendente, Paga, &StatusEvidence::new("paid")).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_applied() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(100.00));
}

#[tokio::test]
async fn test_payload_history_and_end_to_end_recorded() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "reflowpay", dec!(10.00)).await;
    let engine = common::ledger_engine(&pool);

    let evidence = StatusEvidence::new("paid")
        .with_end_to_end_id(Some("E00000000202401011200abcdef".to_string()))
        .with_payload(serde_json::json!({"status": "paid", "value": 1000}));
    engine.apply_status_change(&tx, Pendente, Paga, &evidence).await.unwrap();

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.end_to_end_id.as_deref(), Some("E00000000202401011200abcdef"));
    let history = stored.provider_payload.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["value"], 1000);
}

#[tokio::test]
async fn test_fee_exceeding_gross_leaves_record_untouched() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::fixed(dec!(150.00))).await;
    let tx = common::create_cash_in(&pool, account.id, "podpay", dec!(100.00)).await;
    let engine = common::ledger_engine(&pool);

    let err = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap_err();
    assert!(matches!(err, AppError::FeeConfiguration(_)));

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.status, Pendente);
    assert_eq!(common::balances(&pool, account.id).await.available_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_missing_account_is_soft_skip() {
    let pool = common::setup_test_db().await;
    let engine = common::ledger_engine(&pool);
    let orphan = CashInTransaction::new(Uuid::new_v4(), "podpay", dec!(5.00));

    let outcome = engine.apply_status_change(&orphan, Pendente, Paga, &evidence()).await.unwrap();
    assert_eq!(outcome, LedgerOutcome::AccountMissing { account_id: orphan.account_id });
}

#[tokio::test]
async fn test_failed_withdraw_refunds_once() {
    let pool = common::setup_test_db().await;
    let account = common::create_account_with(
        &pool,
        pix_reconciliation::models::Account::new(common::unique_ref("merchant"))
            .with_available_balance(dec!(500.00)),
    )
    .await;
    let withdraw = common::create_withdraw(&pool, account.id, "podpay", dec!(120.00)).await;
    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(380.00));

    let engine = common::ledger_engine(&pool);
    let first = engine
        .apply_withdraw_status_change(&withdraw, WithdrawStatus::Pending, WithdrawStatus::Failed, &evidence())
        .await
        .unwrap();
    assert!(first.is_applied());

    let again = engine
        .apply_withdraw_status_change(&withdraw, WithdrawStatus::Pending, WithdrawStatus::Canceled, &evidence())
        .await
        .unwrap();
    assert!(!again.is_applied());

    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(500.00));
    let stored = common::reload_withdraw(&pool, withdraw.id).await;
    assert_eq!(stored.status, WithdrawStatus::Failed);
    assert!(stored.refunded_at.is_some());
}

#[tokio::test]
async fn test_paid_withdraw_is_status_flip() {
    let pool = common::setup_test_db().await;
    let account = common::create_account_with(
        &pool,
        pix_reconciliation::models::Account::new(common::unique_ref("merchant"))
            .with_available_balance(dec!(200.00)),
    )
    .await;
    let withdraw = common::create_withdraw(&pool, account.id, "veltrax", dec!(50.00)).await;
    let engine = common::ledger_engine(&pool);

    let evidence = StatusEvidence::new("COMPLETED").with_end_to_end_id(Some("E777".to_string()));
    engine
        .apply_withdraw_status_change(&withdraw, WithdrawStatus::Pending, WithdrawStatus::Paid, &evidence)
        .await
        .unwrap();

    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(150.00));
    let stored = common::reload_withdraw(&pool, withdraw.id).await;
    assert_eq!(stored.status, WithdrawStatus::Paid);
    assert!(stored.processed_at.is_some());
    assert!(stored.refunded_at.is_none());
    assert_eq!(stored.end_to_end(), Some("E777"));

    // Paid is final: a late failure must not refund.
    let late = engine
        .apply_withdraw_status_change(&stored, WithdrawStatus::Paid, WithdrawStatus::Failed, &StatusEvidence::new("FAILED"))
        .await
        .unwrap();
    assert!(!late.is_applied());
    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(150.00));
}

#[tokio::test]
async fn test_wrong_direction_record_is_rejected() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let mut record = CashInTransaction::new(account.id, "podpay", dec!(60.00))
        .with_external_reference(common::unique_ref("dep"));
    record.direction = Direction::Out;
    let tx = TransactionRepository::new(pool.clone()).create(&record).await.unwrap();
    let engine = common::ledger_engine(&pool);

    let err = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap_err();
    assert!(matches!(err, AppError::ContractViolation(_)));
    assert!(!err.is_retriable());

    let balances = common::balances(&pool, account.id).await;
    assert_eq!(balances.available_balance, Decimal::ZERO);
    assert_eq!(balances.blocked_balance, Decimal::ZERO);
    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.status, Pendente);
    assert_eq!(stored.applied_available_amount, Decimal::ZERO);
    assert!(stored.provider_payload.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_held_account_lock_times_out_as_retriable() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "reflowpay", dec!(20.00)).await;
    let engine = LedgerEngine::new(pool.clone(), LedgerSettings { lock_timeout_ms: 200 });

    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(account.id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap_err();
    holder.rollback().await.unwrap();

    assert!(matches!(err, AppError::LockTimeout(_)));
    assert!(err.is_retriable());
    assert_eq!(common::reload_cash_in(&pool, tx.id).await.status, Pendente);

    // Once the lock is released the redelivery goes through.
    let retried = engine.apply_status_change(&tx, Pendente, Paga, &evidence()).await.unwrap();
    assert!(retried.is_applied());
    assert_eq!(common::balances(&pool, account.id).await.available_balance, dec!(20.00));
}

#[tokio::test]
async fn test_provider_time_and_fee_are_recorded() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let tx = common::create_cash_in(&pool, account.id, "veltrax", dec!(45.00)).await;
    let engine = common::ledger_engine(&pool);
    let paid_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

    let mut evidence = StatusEvidence::new("paid").with_provider_ids(Some("vx_paid_1".to_string()), None);
    evidence.occurred_at = Some(paid_at);
    evidence.provider_fee = Some(dec!(0.45));
    engine.apply_status_change(&tx, Pendente, Paga, &evidence).await.unwrap();

    let stored = common::reload_cash_in(&pool, tx.id).await;
    assert_eq!(stored.paid_at, Some(paid_at));
    assert_eq!(stored.provider_fee_amount, Some(dec!(0.45)));
    assert_eq!(stored.provider_transaction_id.as_deref(), Some("vx_paid_1"));
    // The merchant fee is ours, not the provider's.
    assert_eq!(stored.fee_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_withdraw_backfills_provider_reference() {
    let pool = common::setup_test_db().await;
    let account = common::create_account_with(
        &pool,
        pix_reconciliation::models::Account::new(common::unique_ref("merchant"))
            .with_available_balance(dec!(100.00)),
    )
    .await;
    let withdraw = common::create_withdraw(&pool, account.id, "veltrax", dec!(30.00)).await;
    assert!(withdraw.provider_reference.is_none());
    let engine = common::ledger_engine(&pool);
    let processed_at = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();

    let mut evidence = StatusEvidence::new("COMPLETED").with_provider_ids(None, Some("wd_txid_1".to_string()));
    evidence.occurred_at = Some(processed_at);
    evidence.provider_fee = Some(dec!(0.30));
    engine
        .apply_withdraw_status_change(&withdraw, WithdrawStatus::Pending, WithdrawStatus::Paid, &evidence)
        .await
        .unwrap();

    let stored = common::reload_withdraw(&pool, withdraw.id).await;
    assert_eq!(stored.provider_reference.as_deref(), Some("wd_txid_1"));
    assert_eq!(stored.processed_at, Some(processed_at));
    assert_eq!(stored.meta["provider_fee"], "0.30");
}
