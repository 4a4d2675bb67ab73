mod common;

use pix_reconciliation::adapters::{NormalizedWebhookEvent, ProviderKind, ReferenceCandidates};
use pix_reconciliation::config::FinderSettings;
use pix_reconciliation::models::{AccountFeeConfig, CashInTransaction, Direction, Withdraw};
use pix_reconciliation::repositories::{TransactionRepository, WithdrawRepository};
use pix_reconciliation::services::{MatchedBy, TransactionFinder};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn event(provider: ProviderKind, flow: Direction, references: ReferenceCandidates, amount: Option<Decimal>) -> NormalizedWebhookEvent {
    NormalizedWebhookEvent {
        provider,
        flow,
        references,
        provider_status: "paid".to_string(),
        amount,
        fee: None,
        timestamp: None,
        counterparty_name: None,
        counterparty_document: None,
        raw_payload: json!({}),
    }
}

fn finder(pool: &sqlx::PgPool) -> TransactionFinder {
    TransactionFinder::new(pool.clone(), FinderSettings::default())
}

#[tokio::test]
async fn test_external_reference_wins_over_later_tiers() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let repo = TransactionRepository::new(pool.clone());

    let by_ref = repo
        .create(
            &CashInTransaction::new(account.id, "reflowpay", dec!(10.00))
                .with_external_reference(common::unique_ref("order")),
        )
        .await
        .unwrap();
    let by_txid = repo
        .create(&CashInTransaction::new(account.id, "reflowpay", dec!(10.00)).with_txid(common::unique_ref("tx")))
        .await
        .unwrap();

    let refs = ReferenceCandidates {
        external_reference: by_ref.external_reference.clone(),
        txid: by_txid.txid.clone(),
        ..Default::default()
    };
    let found = finder(&pool)
        .find_cash_in(&event(ProviderKind::ReflowPay, Direction::In, refs, None))
        .await
        .unwrap()
        .expect("record should resolve");

    assert_eq!(found.record.id, by_ref.id);
    assert_eq!(found.matched_by, MatchedBy::ExternalReference);
}

#[tokio::test]
async fn test_falls_through_to_end_to_end() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let e2e = common::unique_ref("E");
    let stored = TransactionRepository::new(pool.clone())
        .create(&CashInTransaction::new(account.id, "podpay", dec!(33.00)).with_end_to_end_id(e2e.clone()))
        .await
        .unwrap();

    let refs = ReferenceCandidates {
        external_reference: Some(common::unique_ref("unknown")),
        provider_transaction_id: Some(common::unique_ref("unknown")),
        end_to_end_id: Some(e2e),
        ..Default::default()
    };
    let found = finder(&pool)
        .find_cash_in(&event(ProviderKind::PodPay, Direction::In, refs, None))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.record.id, stored.id);
    assert_eq!(found.matched_by, MatchedBy::EndToEndId);
}

#[tokio::test]
async fn test_amount_window_accepts_single_candidate() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let amount = common::unique_amount();
    let stored = common::create_cash_in(&pool, account.id, "veltrax", amount).await;

    let refs = ReferenceCandidates {
        txid: Some(common::unique_ref("unmatched")),
        ..Default::default()
    };
    let found = finder(&pool)
        .find_cash_in(&event(ProviderKind::Veltrax, Direction::In, refs, Some(amount + dec!(0.05))))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.record.id, stored.id);
    assert!(found.matched_by.is_heuristic());
}

#[tokio::test]
async fn test_amount_window_rejects_ambiguity() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let amount = common::unique_amount();
    common::create_cash_in(&pool, account.id, "veltrax", amount).await;
    common::create_cash_in(&pool, account.id, "veltrax", amount).await;

    let refs = ReferenceCandidates {
        txid: Some(common::unique_ref("unmatched")),
        ..Default::default()
    };
    let found = finder(&pool)
        .find_cash_in(&event(ProviderKind::Veltrax, Direction::In, refs, Some(amount)))
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_amount_window_ignores_other_providers() {
    let pool = common::setup_test_db().await;
    let account = common::create_account(&pool, AccountFeeConfig::disabled()).await;
    let amount = common::unique_amount();
    common::create_cash_in(&pool, account.id, "podpay", amount).await;

    let found = finder(&pool)
        .find_cash_in(&event(ProviderKind::Veltrax, Direction::In, ReferenceCandidates::default(), Some(amount)))
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_withdraw_by_idempotency_key_and_end_to_end() {
    let pool = common::setup_test_db().await;
    let account = common::create_account_with(
        &pool,
        pix_reconciliation::models::Account::new(common::unique_ref("merchant")).with_available_balance(dec!(100.00)),
    )
    .await;

    let key = common::unique_ref("wd");
    let e2e = common::unique_ref("E");
    let withdraw = WithdrawRepository::new(pool.clone())
        .create_with_debit(&Withdraw::new(account.id, "veltrax", dec!(20.00), Decimal::ZERO, key.clone()).with_end_to_end(e2e.clone()))
        .await
        .unwrap();

    let by_key = finder(&pool)
        .find_withdraw(&event(
            ProviderKind::Veltrax,
            Direction::Out,
            ReferenceCandidates {
                external_reference: Some(key),
                ..Default::default()
            },
            None,
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_key.record.id, withdraw.id);
    assert_eq!(by_key.matched_by, MatchedBy::ExternalReference);

    let by_e2e = finder(&pool)
        .find_withdraw(&event(
            ProviderKind::Veltrax,
            Direction::Out,
            ReferenceCandidates {
                end_to_end_id: Some(e2e),
                ..Default::default()
            },
            None,
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_e2e.record.id, withdraw.id);
    assert_eq!(by_e2e.matched_by, MatchedBy::EndToEndId);
}
