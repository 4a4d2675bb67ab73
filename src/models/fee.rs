use crate::error::{AppError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// How an account's cash-in fee is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fee_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    Fixed,
    Percentage,
}

/// Fee settings of one account, passed explicitly into the ledger engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFeeConfig {
    pub enabled: bool,
    pub mode: FeeMode,
    pub fixed_amount: Decimal,
    /// Percentage of gross, e.g. `2.5` for 2.5%.
    pub percentage: Decimal,
}

impl Default for AccountFeeConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AccountFeeConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: FeeMode::Percentage,
            fixed_amount: Decimal::ZERO,
            percentage: Decimal::ZERO,
        }
    }

    pub fn fixed(amount: Decimal) -> Self {
        Self {
            enabled: true,
            mode: FeeMode::Fixed,
            fixed_amount: amount,
            percentage: Decimal::ZERO,
        }
    }

    pub fn percentage(percentage: Decimal) -> Self {
        Self {
            enabled: true,
            mode: FeeMode::Percentage,
            fixed_amount: Decimal::ZERO,
            percentage,
        }
    }

    /// Fee charged on a gross cash-in amount, rounded to cents.
    pub fn fee_for(&self, gross: Decimal) -> Result<Decimal> {
        if !self.enabled {
            return Ok(Decimal::ZERO);
        }

        let fee = match self.mode {
            FeeMode::Fixed => self.fixed_amount,
            FeeMode::Percentage => gross * self.percentage / Decimal::ONE_HUNDRED,
        };

        if fee.is_sign_negative() && !fee.is_zero() {
            return Err(AppError::FeeConfiguration(format!(
                "{:?} fee resolves to a negative amount ({})",
                self.mode, fee
            )));
        }

        Ok(round_cents(fee))
    }

    /// Amount credited to the wallet for a paid cash-in of `gross`.
    ///
    /// Fails when the fee would consume more than the transaction itself.
    pub fn net_for(&self, gross: Decimal) -> Result<Decimal> {
        let net = round_cents(gross) - self.fee_for(gross)?;

        if net.is_sign_negative() && !net.is_zero() {
            return Err(AppError::FeeConfiguration(format!(
                "fee exceeds gross amount {} (net would be {})",
                gross, net
            )));
        }

        Ok(net)
    }
}

/// Rounds a monetary value to two decimal places, half away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
