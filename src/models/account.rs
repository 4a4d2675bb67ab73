use crate::models::fee::{AccountFeeConfig, FeeMode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A wallet owner. Balances are only ever changed by the ledger engine while
/// holding this row's lock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub available_balance: Decimal,
    /// Reserved bucket, not moved by reconciliation.
    pub retained_balance: Decimal,
    /// Funds frozen under manual review.
    pub blocked_balance: Decimal,
    pub fee_enabled: bool,
    pub fee_mode: FeeMode,
    pub fee_fixed_amount: Decimal,
    pub fee_percentage: Decimal,
    /// Cash-ins above this amount are held for review. Overrides the provider threshold.
    pub review_threshold: Option<Decimal>,
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an account with zero balances and no fee.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            available_balance: Decimal::ZERO,
            retained_balance: Decimal::ZERO,
            blocked_balance: Decimal::ZERO,
            fee_enabled: false,
            fee_mode: FeeMode::Percentage,
            fee_fixed_amount: Decimal::ZERO,
            fee_percentage: Decimal::ZERO,
            review_threshold: None,
            webhook_url: None,
            webhook_secret: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_available_balance(mut self, amount: Decimal) -> Self {
        self.available_balance = amount;
        self
    }

    pub fn with_fee(mut self, fee: AccountFeeConfig) -> Self {
        self.fee_enabled = fee.enabled;
        self.fee_mode = fee.mode;
        self.fee_fixed_amount = fee.fixed_amount;
        self.fee_percentage = fee.percentage;
        self
    }

    pub fn with_review_threshold(mut self, threshold: Decimal) -> Self {
        self.review_threshold = Some(threshold);
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>, secret: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn fee_config(&self) -> AccountFeeConfig {
        AccountFeeConfig {
            enabled: self.fee_enabled,
            mode: self.fee_mode,
            fixed_amount: self.fee_fixed_amount,
            percentage: self.fee_percentage,
        }
    }

    /// Callback target, only when both URL and signing secret are configured.
    pub fn callback(&self) -> Option<(&str, &str)> {
        match (self.webhook_url.as_deref(), self.webhook_secret.as_deref()) {
            (Some(url), Some(secret)) if !url.trim().is_empty() && !secret.is_empty() => {
                Some((url, secret))
            }
            _ => None,
        }
    }
}

/// Balance columns read under lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct AccountBalances {
    pub available_balance: Decimal,
    pub blocked_balance: Decimal,
}
