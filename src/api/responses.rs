use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Acknowledgement returned to the provider for every accepted webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    /// True when the body was seen before and the recorded outcome is returned.
    pub replayed: bool,
    pub outcome: serde_json::Value,
}

impl WebhookAck {
    pub fn new(outcome: serde_json::Value, replayed: bool) -> Self {
        Self {
            received: true,
            replayed,
            outcome,
        }
    }
}

pub type ErrorReply = (StatusCode, Json<ApiResponse<()>>);

/// Maps an error to its HTTP reply. Retriable failures become 503 so the
/// provider redelivers; internals are never echoed back.
pub fn error_reply(err: &AppError) -> ErrorReply {
    let status = if err.is_retriable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        match err {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::FeeConfiguration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };

    let message = match err {
        AppError::NotFound(msg) | AppError::Validation(msg) | AppError::FeeConfiguration(msg) => msg.clone(),
        _ if err.is_retriable() => "Temporarily unavailable, retry later".to_string(),
        _ => "An internal error occurred".to_string(),
    };

    (
        status,
        Json(ApiResponse::<()>::error(ErrorResponse::new(err.code(), message))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_status_mapping() {
        assert_eq!(
            error_reply(&AppError::LockTimeout("busy".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_reply(&AppError::ContractViolation("direction".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(error_reply(&AppError::Validation("bad".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(error_reply(&AppError::NotFound("x".into())).0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_contract_violation_detail_is_hidden() {
        let (_, Json(body)) = error_reply(&AppError::ContractViolation("secret detail".into()));
        let error = body.error.unwrap();
        assert_eq!(error.code, "CONTRACT_VIOLATION");
        assert_eq!(error.message, "An internal error occurred");
    }
}
