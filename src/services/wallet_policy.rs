//! Pure balance planning for status transitions.
//!
//! Every plan is expressed as a target footprint. The delta applied to the
//! account is always `target - previously applied`, so replaying a plan whose
//! footprint already matches yields a zero delta.

use crate::error::Result;
use crate::models::{AccountFeeConfig, CanonicalStatus, WalletFootprint, WithdrawStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance effect of one cash-in transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePlan {
    pub target: WalletFootprint,
    pub delta_available: Decimal,
    pub delta_blocked: Decimal,
    /// Fee retained by the platform, set when the record becomes paid.
    pub fee_amount: Option<Decimal>,
}

impl BalancePlan {
    fn towards(previous: WalletFootprint, target: WalletFootprint) -> Self {
        Self {
            target,
            delta_available: target.available - previous.available,
            delta_blocked: target.blocked - previous.blocked,
            fee_amount: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.delta_available.is_zero() && self.delta_blocked.is_zero()
    }
}

/// Plans the footprint of a cash-in moving from `old` to `new`.
pub fn plan_cash_in(
    old: CanonicalStatus,
    new: CanonicalStatus,
    gross: Decimal,
    previous: WalletFootprint,
    fee: &AccountFeeConfig,
) -> Result<BalancePlan> {
    use CanonicalStatus::*;

    let plan = match (old, new) {
        (_, Paga) => {
            let net = fee.net_for(gross)?;
            let mut plan = BalancePlan::towards(previous, WalletFootprint::new(net, Decimal::ZERO));
            plan.fee_amount = Some(gross - net);
            plan
        }
        // An existing hold is never re-sized.
        (_, Med) if previous.has_block() => BalancePlan::towards(previous, previous),
        // Escalation after credit: pull the full gross back into the hold.
        (Paga, Med) => BalancePlan::towards(
            previous,
            WalletFootprint::new(previous.available - gross, gross),
        ),
        (_, Med) => BalancePlan::towards(previous, WalletFootprint::new(Decimal::ZERO, gross)),
        (Med, Pendente) => BalancePlan::towards(
            previous,
            WalletFootprint::new(previous.available, Decimal::ZERO),
        ),
        // Hold stays in place for manual resolution.
        (Med, Falha) | (Med, Erro) => BalancePlan::towards(previous, previous),
        (_, Pendente) | (_, Falha) | (_, Erro) => {
            BalancePlan::towards(previous, WalletFootprint::EMPTY)
        }
    };

    Ok(plan)
}

/// Balance effect of one withdraw transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawPlan {
    /// Amount credited back to `available_balance`.
    pub refund: Decimal,
    pub mark_refunded: bool,
    pub mark_processed: bool,
}

/// Plans a withdraw transition. The debit happened at creation, so only a
/// failure moves money, and only once.
pub fn plan_withdraw(new: WithdrawStatus, gross: Decimal, already_refunded: bool) -> WithdrawPlan {
    if new.triggers_refund() && !already_refunded {
        WithdrawPlan {
            refund: gross,
            mark_refunded: true,
            mark_processed: false,
        }
    } else {
        WithdrawPlan {
            refund: Decimal::ZERO,
            mark_refunded: false,
            mark_processed: new == WithdrawStatus::Paid,
        }
    }
}
