use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics facade for the reconciliation pipeline.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_webhook_received(&self, provider: &str, flow: &str) {
        counter!("pix_webhooks_received_total", "provider" => provider.to_string(), "flow" => flow.to_string()).increment(1);
    }

    /// `outcome` is one of `applied`, `duplicate`, `ignored`, `not_found`, `failed`.
    pub fn record_reconciliation(&self, flow: &str, outcome: &str) {
        counter!("pix_reconciliation_outcomes_total", "flow" => flow.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_balance_delta(&self, bucket: &str, delta: Decimal) {
        if delta.is_zero() {
            return;
        }
        let direction = if delta.is_sign_positive() { "credit" } else { "debit" };
        counter!("pix_balance_mutations_total", "bucket" => bucket.to_string(), "direction" => direction).increment(1);
        histogram!("pix_balance_delta_amount", "bucket" => bucket.to_string())
            .record(delta.abs().to_f64().unwrap_or_default());
    }

    pub fn record_lock_wait(&self, duration_ms: f64) {
        histogram!("pix_ledger_lock_wait_ms").record(duration_ms);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("pix_ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_lock_timeout(&self, flow: &str) {
        counter!("pix_ledger_lock_timeouts_total", "flow" => flow.to_string()).increment(1);
    }

    pub fn record_finder_match(&self, flow: &str, matched_by: &str) {
        counter!("pix_finder_matches_total", "flow" => flow.to_string(), "matched_by" => matched_by.to_string()).increment(1);
    }

    pub fn record_notifier_delivery(&self, success: bool, attempts: u32) {
        counter!("pix_notifier_deliveries_total", "success" => success.to_string()).increment(1);
        histogram!("pix_notifier_attempts").record(attempts as f64);
    }

    pub fn record_dedupe_hit(&self, provider: &str) {
        counter!("pix_webhook_dedupe_hits_total", "provider" => provider.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_redis_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("redis_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("redis_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its render handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("pix_webhooks_received_total", Unit::Count, "Provider webhooks received");
    describe_counter!("pix_reconciliation_outcomes_total", Unit::Count, "Reconciliation outcomes by flow");
    describe_counter!("pix_balance_mutations_total", Unit::Count, "Wallet balance mutations applied");
    describe_histogram!("pix_balance_delta_amount", Unit::Count, "Absolute balance delta per mutation");
    describe_histogram!("pix_ledger_lock_wait_ms", Unit::Milliseconds, "Time spent acquiring the account row lock");
    describe_histogram!("pix_ledger_write_duration_ms", Unit::Milliseconds, "Ledger transition latency");
    describe_counter!("pix_ledger_lock_timeouts_total", Unit::Count, "Account lock acquisitions that timed out");
    describe_counter!("pix_finder_matches_total", Unit::Count, "Records resolved by finder tier");
    describe_counter!("pix_notifier_deliveries_total", Unit::Count, "Merchant callback deliveries");
    describe_histogram!("pix_notifier_attempts", Unit::Count, "Attempts per merchant callback");
    describe_counter!("pix_webhook_dedupe_hits_total", Unit::Count, "Webhook deliveries dropped as replays");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
    describe_counter!("redis_operations_total", Unit::Count, "Total Redis operations");
    describe_histogram!("redis_operation_duration_ms", Unit::Milliseconds, "Redis operation latency in milliseconds");
    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
