use crate::error::{AppError, Result};
use crate::models::{CanonicalStatus, WithdrawStatus};
use serde::{Deserialize, Serialize};

/// What the terminal-state guard decided about a proposed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    /// The ledger engine should run.
    Proceed,
    /// Record already sits in the proposed state.
    Duplicate,
    /// Record is final and the proposed state may not follow it.
    Terminal,
    /// Proposed state would move the record backwards.
    Regression,
}

impl GuardDecision {
    pub fn should_apply(&self) -> bool {
        matches!(self, GuardDecision::Proceed)
    }
}

/// Transition table for cash-in records.
#[derive(Debug, Clone)]
pub struct CashInStateMachine;

impl CashInStateMachine {
    /// Returns valid next states from the current state.
    pub fn valid_transitions(current: CanonicalStatus) -> Vec<CanonicalStatus> {
        match current {
            CanonicalStatus::Pendente => vec![
                CanonicalStatus::Paga,
                CanonicalStatus::Med,
                CanonicalStatus::Falha,
                CanonicalStatus::Erro,
            ],
            CanonicalStatus::Med => vec![
                CanonicalStatus::Pendente,
                CanonicalStatus::Paga,
                CanonicalStatus::Falha,
                CanonicalStatus::Erro,
            ],
            // Manual fraud escalation after credit
            CanonicalStatus::Paga => vec![CanonicalStatus::Med],
            CanonicalStatus::Falha => vec![],
            CanonicalStatus::Erro => vec![],
        }
    }

    pub fn can_transition(from: CanonicalStatus, to: CanonicalStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    /// Classifies a proposed transition without touching any state.
    pub fn guard(from: CanonicalStatus, to: CanonicalStatus) -> GuardDecision {
        if from == to {
            GuardDecision::Duplicate
        } else if Self::can_transition(from, to) {
            GuardDecision::Proceed
        } else {
            GuardDecision::Terminal
        }
    }

    /// Attempts to transition to a new state.
    pub fn transition(from: CanonicalStatus, to: CanonicalStatus) -> Result<CanonicalStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Validation(format!(
                "Invalid cash-in transition from {} to {}",
                from, to
            )))
        }
    }
}

/// Transition table for withdraws.
#[derive(Debug, Clone)]
pub struct WithdrawStateMachine;

impl WithdrawStateMachine {
    pub fn valid_transitions(current: WithdrawStatus) -> Vec<WithdrawStatus> {
        match current {
            WithdrawStatus::Pending => vec![
                WithdrawStatus::Processing,
                WithdrawStatus::Paid,
                WithdrawStatus::Failed,
                WithdrawStatus::Canceled,
            ],
            WithdrawStatus::Processing => vec![
                WithdrawStatus::Paid,
                WithdrawStatus::Failed,
                WithdrawStatus::Canceled,
            ],
            WithdrawStatus::Paid | WithdrawStatus::Failed | WithdrawStatus::Canceled => vec![],
        }
    }

    pub fn can_transition(from: WithdrawStatus, to: WithdrawStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn guard(from: WithdrawStatus, to: WithdrawStatus) -> GuardDecision {
        if from == to {
            GuardDecision::Duplicate
        } else if from.is_terminal() {
            GuardDecision::Terminal
        } else if Self::can_transition(from, to) {
            GuardDecision::Proceed
        } else {
            GuardDecision::Regression
        }
    }

    pub fn transition(from: WithdrawStatus, to: WithdrawStatus) -> Result<WithdrawStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Validation(format!(
                "Invalid withdraw transition from {} to {}",
                from, to
            )))
        }
    }
}
