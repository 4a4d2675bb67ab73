mod common;

use pix_reconciliation::config::DedupeSettings;
use pix_reconciliation::error::AppError;
use pix_reconciliation::idempotency::{Delivery, DeliveryCheck, DeliveryDeduplicator};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn deduplicator(pool: &sqlx::PgPool) -> DeliveryDeduplicator {
    DeliveryDeduplicator::new(pool.clone(), None, DedupeSettings::default())
}

fn key() -> String {
    DeliveryDeduplicator::delivery_key("podpay", "in", common::unique_ref("body").as_bytes())
}

#[tokio::test]
async fn test_completed_delivery_is_replayed() {
    let pool = common::setup_test_db().await;
    let dedupe = deduplicator(&pool);
    let key = key();
    let runs = AtomicUsize::new(0);

    let first = dedupe
        .execute("podpay", &key, || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(json!({"outcome": "applied"}))
        })
        .await
        .unwrap();
    let second = dedupe
        .execute("podpay", &key, || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(json!({"outcome": "applied"}))
        })
        .await
        .unwrap();

    assert_eq!(first, Delivery::Fresh(json!({"outcome": "applied"})));
    assert_eq!(second, Delivery::Replayed(json!({"outcome": "applied"})));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_delivery_runs_again() {
    let pool = common::setup_test_db().await;
    let dedupe = deduplicator(&pool);
    let key = key();

    let failed = dedupe
        .execute("podpay", &key, || async {
            Err::<serde_json::Value, _>(AppError::LockTimeout("lock wait exceeded".to_string()))
        })
        .await;
    assert!(failed.is_err());

    let retried = dedupe
        .execute("podpay", &key, || async { Ok::<_, AppError>(json!({"outcome": "duplicate"})) })
        .await
        .unwrap();
    assert!(matches!(retried, Delivery::Fresh(_)));
}

#[tokio::test]
async fn test_claimed_delivery_reports_in_flight() {
    let pool = common::setup_test_db().await;
    let dedupe = deduplicator(&pool);
    let key = key();

    assert_eq!(dedupe.check("podpay", &key).await.unwrap(), DeliveryCheck::New);
    assert_eq!(dedupe.check("podpay", &key).await.unwrap(), DeliveryCheck::InFlight);

    dedupe.complete(&key, &json!({"outcome": "not_found"})).await.unwrap();
    assert_eq!(
        dedupe.check("podpay", &key).await.unwrap(),
        DeliveryCheck::Completed(json!({"outcome": "not_found"}))
    );
}

#[test]
fn test_delivery_key_separates_flows() {
    let body = br#"{"status":"paid"}"#;
    assert_ne!(
        DeliveryDeduplicator::delivery_key("veltrax", "in", body),
        DeliveryDeduplicator::delivery_key("veltrax", "out", body)
    );
    assert_eq!(
        DeliveryDeduplicator::delivery_key("Veltrax", "in", body),
        DeliveryDeduplicator::delivery_key("veltrax", "in", body)
    );
}
