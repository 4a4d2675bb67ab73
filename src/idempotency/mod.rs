//! Webhook delivery dedupe.

pub mod handler;
pub mod storage;

pub use handler::{Delivery, DeliveryCheck, DeliveryCleanupJob, DeliveryDeduplicator};
pub use storage::{
    DeliveryRecord, DeliveryStatus, HybridDeliveryStore, PostgresDeliveryStore, RedisDeliveryCache,
};
