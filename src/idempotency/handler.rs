use crate::config::DedupeSettings;
use crate::error::{AppError, Result};
use crate::idempotency::storage::{
    DeliveryRecord, DeliveryStatus, HybridDeliveryStore, PostgresDeliveryStore, RedisDeliveryCache,
};
use crate::observability::get_metrics;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What the deduplicator found for a delivery key.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryCheck {
    /// This caller owns the delivery and must run the pipeline.
    New,
    /// Same body already processed; carries the recorded outcome.
    Completed(serde_json::Value),
    /// Same body currently being processed elsewhere.
    InFlight,
}

/// Result of running a delivery through the deduplicator.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Fresh(serde_json::Value),
    Replayed(serde_json::Value),
    InFlight,
}

/// Transport-level guard against providers redelivering the same webhook body.
/// Ledger correctness never depends on it; it only saves work.
pub struct DeliveryDeduplicator {
    store: HybridDeliveryStore,
    settings: DedupeSettings,
}

impl DeliveryDeduplicator {
    pub fn new(pool: PgPool, redis_client: Option<redis::Client>, settings: DedupeSettings) -> Self {
        let postgres = PostgresDeliveryStore::new(pool);
        let redis = redis_client.map(|client| RedisDeliveryCache::new(client, settings.key_prefix.clone()));
        let store = HybridDeliveryStore::new(postgres, redis, settings.ttl_seconds);

        Self { store, settings }
    }

    /// Content hash of one delivery. The flow is part of the key because the
    /// same provider may post identical bodies to both endpoints.
    pub fn delivery_key(provider: &str, flow: &str, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(flow.as_bytes());
        hasher.update(b"|");
        hasher.update(body);
        hex::encode(hasher.finalize())
    }

    pub async fn check(&self, provider: &str, delivery_key: &str) -> Result<DeliveryCheck> {
        let record = DeliveryRecord::new(delivery_key, provider, self.settings.ttl_seconds);

        let Some(existing) = self.store.try_acquire(&record).await? else {
            return Ok(DeliveryCheck::New);
        };

        get_metrics().record_dedupe_hit(provider);
        match existing.status {
            DeliveryStatus::Completed => Ok(DeliveryCheck::Completed(
                existing.outcome.unwrap_or(serde_json::Value::Null),
            )),
            DeliveryStatus::Processing => Ok(DeliveryCheck::InFlight),
            // Postgres reclaims failed keys on acquire, so this only shows up on a race.
            DeliveryStatus::Failed => Ok(DeliveryCheck::InFlight),
        }
    }

    pub async fn complete<T: Serialize>(&self, delivery_key: &str, outcome: &T) -> Result<()> {
        let value = serde_json::to_value(outcome)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize outcome: {}", e)))?;
        self.store.mark_completed(delivery_key, value).await?;
        Ok(())
    }

    pub async fn fail(&self, delivery_key: &str, error_message: &str) -> Result<()> {
        self.store.mark_failed(delivery_key, error_message).await?;
        Ok(())
    }

    /// Runs `operation` at most once per delivery key while it keeps succeeding.
    /// Failures are recorded so the provider's redelivery runs it again.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        delivery_key: &str,
        operation: F,
    ) -> Result<Delivery>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.check(provider, delivery_key).await? {
            DeliveryCheck::Completed(outcome) => {
                debug!(provider, delivery_key, "Replaying recorded webhook outcome");
                return Ok(Delivery::Replayed(outcome));
            }
            DeliveryCheck::InFlight => {
                info!(provider, delivery_key, "Identical webhook already in flight");
                return Ok(Delivery::InFlight);
            }
            DeliveryCheck::New => {}
        }

        match operation().await {
            Ok(outcome) => {
                let value = serde_json::to_value(&outcome)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize outcome: {}", e)))?;
                if let Err(e) = self.store.mark_completed(delivery_key, value.clone()).await {
                    error!(delivery_key, error = %e, "Failed to mark delivery completed");
                }
                Ok(Delivery::Fresh(value))
            }
            Err(e) => {
                if let Err(mark_err) = self.fail(delivery_key, &e.to_string()).await {
                    error!(delivery_key, error = %mark_err, "Failed to mark delivery failed");
                }
                Err(e)
            }
        }
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.store.cleanup_expired().await
    }
}

/// Periodically deletes expired delivery records.
pub struct DeliveryCleanupJob {
    deduplicator: Arc<DeliveryDeduplicator>,
    interval_seconds: u64,
}

impl DeliveryCleanupJob {
    pub fn new(deduplicator: Arc<DeliveryDeduplicator>, interval_seconds: u64) -> Self {
        Self {
            deduplicator,
            interval_seconds,
        }
    }

    pub async fn run_once(&self) -> Result<u64> {
        self.deduplicator.cleanup_expired().await
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(self.interval_seconds));

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(count) if count > 0 => info!(count, "Cleaned up expired webhook deliveries"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to clean up webhook deliveries"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_key_is_stable_and_scoped() {
        let body = br#"{"status":"paid"}"#;
        let a = DeliveryDeduplicator::delivery_key("PodPay", "in", body);
        let b = DeliveryDeduplicator::delivery_key("podpay", "in", body);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, DeliveryDeduplicator::delivery_key("podpay", "out", body));
        assert_ne!(a, DeliveryDeduplicator::delivery_key("veltrax", "in", body));
        assert_ne!(a, DeliveryDeduplicator::delivery_key("podpay", "in", br#"{"status":"failed"}"#));
    }
}
