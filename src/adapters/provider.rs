use crate::adapters::normalized::NormalizedWebhookEvent;
use crate::adapters::{podpay, reflowpay, veltrax};
use crate::error::{AppError, Result};
use crate::models::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Payment processors we accept webhooks from. Each variant owns the
/// translation of its payload shape into a [`NormalizedWebhookEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    ReflowPay,
    PodPay,
    Veltrax,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ReflowPay => "reflowpay",
            ProviderKind::PodPay => "podpay",
            ProviderKind::Veltrax => "veltrax",
        }
    }

    pub fn parse(&self, flow: Direction, raw: &Value) -> Result<NormalizedWebhookEvent> {
        if !raw.is_object() {
            return Err(AppError::Validation(format!(
                "{} webhook body is not a JSON object",
                self
            )));
        }

        let event = match self {
            ProviderKind::ReflowPay => reflowpay::parse(flow, raw),
            ProviderKind::PodPay => podpay::parse(flow, raw),
            ProviderKind::Veltrax => veltrax::parse(flow, raw),
        }?;

        // An amount alone can still match through the amount window.
        if event.references.is_empty() && event.amount.is_none() {
            return Err(AppError::Validation(format!(
                "{} webhook carries neither a reference nor an amount",
                self
            )));
        }

        Ok(event)
    }

    /// Guesses the flow of a payload posted to a direction-less endpoint.
    pub fn infer_flow(&self, raw: &Value) -> Direction {
        match self {
            ProviderKind::Veltrax => veltrax::infer_flow(raw),
            ProviderKind::ReflowPay | ProviderKind::PodPay => Direction::In,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reflowpay" | "reflow" => Ok(ProviderKind::ReflowPay),
            "podpay" => Ok(ProviderKind::PodPay),
            "veltrax" | "veltraxpay" => Ok(ProviderKind::Veltrax),
            other => Err(AppError::NotFound(format!("Unknown provider '{}'", other))),
        }
    }
}
