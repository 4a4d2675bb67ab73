use axum::{
    body::Bytes,
    extract::{MatchedPath, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::adapters::ProviderKind;
use crate::api::requests::ReviewDecisionRequest;
use crate::api::responses::{
    error_reply, ApiResponse, ErrorReply, ErrorResponse, ValidationErrorDetail, WebhookAck,
};
use crate::error::AppError;
use crate::idempotency::{Delivery, DeliveryDeduplicator};
use crate::models::Direction;
use crate::observability::{get_metrics, AggregatedHealth, LatencyTimer};
use crate::services::ReconciliationOutcome;

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(ApiResponse::success(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// `POST /webhooks/:provider/cash-in`
pub async fn cash_in_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ErrorReply> {
    process_webhook(&state, &provider, Some(Direction::In), body).await
}

/// `POST /webhooks/:provider/cash-out`
pub async fn cash_out_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ErrorReply> {
    process_webhook(&state, &provider, Some(Direction::Out), body).await
}

/// `POST /webhooks/:provider` for providers that share one endpoint across flows.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ErrorReply> {
    process_webhook(&state, &provider, None, body).await
}

async fn process_webhook(
    state: &AppState,
    provider: &str,
    flow: Option<Direction>,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ErrorReply> {
    let provider: ProviderKind = provider.parse().map_err(|e: AppError| error_reply(&e))?;

    let raw: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        error_reply(&AppError::Validation(format!("Webhook body is not valid JSON: {}", e)))
    })?;

    let flow = flow.unwrap_or_else(|| provider.infer_flow(&raw));
    let event = provider.parse(flow, &raw).map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Rejected webhook payload");
        error_reply(&e)
    })?;

    let delivery_key = DeliveryDeduplicator::delivery_key(provider.as_str(), flow.as_str(), &body);
    let service = state.reconciliation.clone();

    let delivery = state
        .deduplicator
        .execute(provider.as_str(), &delivery_key, || async move {
            service.handle_event(&event).await
        })
        .await;

    match delivery {
        Ok(Delivery::Fresh(outcome)) => Ok(Json(ApiResponse::success(WebhookAck::new(outcome, false)))),
        Ok(Delivery::Replayed(outcome)) => Ok(Json(ApiResponse::success(WebhookAck::new(outcome, true)))),
        Ok(Delivery::InFlight) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(ErrorResponse::new(
                "DELIVERY_IN_FLIGHT",
                "Identical webhook is still being processed",
            ))),
        )),
        Err(e) => {
            if e.is_retriable() {
                tracing::warn!(provider = %provider, error = %e, "Webhook failed, asking provider to retry");
            } else {
                tracing::error!(provider = %provider, error = %e, "Webhook processing failed");
            }
            Err(error_reply(&e))
        }
    }
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// `POST /admin/transactions/:id/review`
pub async fn resolve_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewDecisionRequest>,
) -> Result<Json<ApiResponse<ReconciliationOutcome>>, ErrorReply> {
    let target = request.validate().map_err(|errors| {
        let details: Vec<ValidationErrorDetail> = errors
            .into_iter()
            .map(|e| ValidationErrorDetail {
                field: e.field,
                message: e.message,
            })
            .collect();

        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                ErrorResponse::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
            )),
        )
    })?;

    match state.reconciliation.resolve_review(id, target, request.note).await {
        Ok(outcome) => Ok(Json(ApiResponse::success(outcome))),
        Err(e) => {
            tracing::warn!(transaction_id = %id, error = %e, "Review decision rejected");
            Err(error_reply(&e))
        }
    }
}

/// Records request count and latency per matched route.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}
