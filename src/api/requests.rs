use serde::{Deserialize, Serialize};

use crate::models::CanonicalStatus;

/// Operator decision on a held cash-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecisionRequest {
    /// Target canonical status, e.g. `PAGA` or `FALHA`.
    pub status: String,
    pub note: Option<String>,
}

impl ReviewDecisionRequest {
    pub fn validate(&self) -> Result<CanonicalStatus, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let target = match self.status.trim().to_uppercase().parse::<CanonicalStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.push(ValidationError {
                    field: "status".to_string(),
                    message: "status must be one of PENDENTE, PAGA, MED, FALHA, ERRO".to_string(),
                });
                None
            }
        };

        if self.note.as_deref().map(str::len).unwrap_or(0) > 500 {
            errors.push(ValidationError {
                field: "note".to_string(),
                message: "note cannot exceed 500 characters".to_string(),
            });
        }

        match target {
            Some(status) if errors.is_empty() => Ok(status),
            _ => Err(errors),
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}
