//! PIX ledger reconciliation: turns provider webhooks into exactly-once
//! balance changes on merchant accounts.

pub mod adapters;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod repositories;
pub mod services;
