use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical lifecycle of a cash-in transaction, independent of any provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cash_in_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    /// Waiting for the payer.
    Pendente,
    /// Funds received and credited.
    Paga,
    /// Funds frozen pending manual review.
    Med,
    /// Payment failed or was canceled.
    Falha,
    /// Provider or internal error.
    Erro,
}

/// Provider vocabulary, grouped by the cash-in state each word maps to.
/// Anything not listed here is treated as still pending.
const PAID_WORDS: &[&str] = &[
    "paid", "paga", "pago", "approved", "completed", "complete", "success", "succeeded",
    "confirmed", "aprovado", "confirmado", "concluido", "settled",
];
const REVIEW_WORDS: &[&str] = &[
    "med", "under_review", "in_review", "review", "in_analysis", "analise", "analyzing",
    "blocked", "held", "infraction", "dispute", "disputed",
];
const FAILED_WORDS: &[&str] = &[
    "failed", "falha", "falhou", "rejected", "rejeitado", "refused", "declined", "denied",
    "error_payment", "canceled", "cancelled", "cancelado", "expired", "timeout",
    "chargeback", "returned", "refunded", "estornado",
];
const ERROR_WORDS: &[&str] = &[
    "error", "erro", "internal_error", "provider_error", "invalid",
];

impl CanonicalStatus {
    /// Maps a provider status word to a canonical state.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unknown or empty input maps to `Pendente`: an unrecognised word must
    /// never credit a wallet.
    pub fn normalize(provider_status: &str) -> Self {
        let status = provider_status.trim().to_lowercase();

        if PAID_WORDS.contains(&status.as_str()) {
            CanonicalStatus::Paga
        } else if REVIEW_WORDS.contains(&status.as_str()) {
            CanonicalStatus::Med
        } else if FAILED_WORDS.contains(&status.as_str()) {
            CanonicalStatus::Falha
        } else if ERROR_WORDS.contains(&status.as_str()) {
            CanonicalStatus::Erro
        } else {
            CanonicalStatus::Pendente
        }
    }

    /// Lenient parse that never fails: accepts canonical names as well as any
    /// provider vocabulary.
    pub fn from_loose(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| Self::normalize(value))
    }

    /// Terminal for cash-in purposes. `Paga` still admits the review escalation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalStatus::Paga | CanonicalStatus::Falha | CanonicalStatus::Erro
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Pendente => "PENDENTE",
            CanonicalStatus::Paga => "PAGA",
            CanonicalStatus::Med => "MED",
            CanonicalStatus::Falha => "FALHA",
            CanonicalStatus::Erro => "ERRO",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalStatus {
    type Err = String;

    /// Strict parse of canonical names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDENTE" => Ok(CanonicalStatus::Pendente),
            "PAGA" => Ok(CanonicalStatus::Paga),
            "MED" => Ok(CanonicalStatus::Med),
            "FALHA" => Ok(CanonicalStatus::Falha),
            "ERRO" => Ok(CanonicalStatus::Erro),
            other => Err(format!("unknown canonical status '{}'", other)),
        }
    }
}

/// Lifecycle of a cash-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdraw_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Canceled,
}

const WITHDRAW_PROCESSING_WORDS: &[&str] = &[
    "processing", "processando", "in_progress", "sent", "submitted", "in_analysis",
];
const WITHDRAW_PAID_WORDS: &[&str] = &[
    "paid", "paga", "pago", "completed", "complete", "success", "succeeded", "confirmed",
    "approved", "done", "concluido", "settled",
];
const WITHDRAW_FAILED_WORDS: &[&str] = &[
    "failed", "falha", "falhou", "error", "erro", "rejected", "refused", "declined",
    "denied", "returned", "refunded", "estornado", "expired",
];
const WITHDRAW_CANCELED_WORDS: &[&str] = &["canceled", "cancelled", "cancelado"];

impl WithdrawStatus {
    /// Maps a provider payout status to the withdraw lifecycle. Unknown input
    /// stays `Pending`, which never moves money.
    pub fn normalize(provider_status: &str) -> Self {
        let status = provider_status.trim().to_lowercase();

        if WITHDRAW_PAID_WORDS.contains(&status.as_str()) {
            WithdrawStatus::Paid
        } else if WITHDRAW_CANCELED_WORDS.contains(&status.as_str()) {
            WithdrawStatus::Canceled
        } else if WITHDRAW_FAILED_WORDS.contains(&status.as_str()) {
            WithdrawStatus::Failed
        } else if WITHDRAW_PROCESSING_WORDS.contains(&status.as_str()) {
            WithdrawStatus::Processing
        } else {
            WithdrawStatus::Pending
        }
    }

    pub fn from_loose(value: &str) -> Self {
        Self::normalize(value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawStatus::Paid | WithdrawStatus::Failed | WithdrawStatus::Canceled
        )
    }

    /// Failed and canceled payouts give the debited funds back.
    pub fn triggers_refund(&self) -> bool {
        matches!(self, WithdrawStatus::Failed | WithdrawStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Pending => "pending",
            WithdrawStatus::Processing => "processing",
            WithdrawStatus::Paid => "paid",
            WithdrawStatus::Failed => "failed",
            WithdrawStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
