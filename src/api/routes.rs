use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::HeaderName;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::DeliveryDeduplicator;
use crate::observability::HealthChecker;
use crate::services::ReconciliationService;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub reconciliation: Arc<ReconciliationService>,
    pub deduplicator: Arc<DeliveryDeduplicator>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        reconciliation: Arc<ReconciliationService>,
        deduplicator: Arc<DeliveryDeduplicator>,
        health_checker: Arc<HealthChecker>,
    ) -> Self {
        Self {
            pool,
            reconciliation,
            deduplicator,
            health_checker,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Provider webhooks
        .route("/webhooks/:provider", post(handlers::provider_webhook))
        .route("/webhooks/:provider/cash-in", post(handlers::cash_in_webhook))
        .route("/webhooks/:provider/cash-out", post(handlers::cash_out_webhook))
        // Manual review
        .route("/admin/transactions/:id/review", post(handlers::resolve_review))
        .route_layer(middleware::from_fn(handlers::track_metrics))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
