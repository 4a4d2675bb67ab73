use crate::config::NotifierSettings;
use crate::error::{AppError, Result};
use crate::notifier::payload::CallbackPayload;
use crate::notifier::signature::signature_header;
use crate::observability::get_metrics;
use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of one callback delivery, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub status: Option<u16>,
    pub success: bool,
}

/// Signs and posts merchant callbacks.
pub struct WebhookNotifier {
    client: reqwest::Client,
    settings: NotifierSettings,
}

impl WebhookNotifier {
    pub fn new(settings: NotifierSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    /// Posts the payload, retrying on transport errors and non-2xx answers.
    pub async fn deliver(&self, url: &str, secret: &str, payload: &CallbackPayload) -> Result<DeliveryReport> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow!("Failed to serialize callback: {}", e)))?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = signature_header(secret, &timestamp, &body)?;

        let max_attempts = self.settings.max_retries + 1;
        let mut report = DeliveryReport {
            attempts: 0,
            status: None,
            success: false,
        };

        while report.attempts < max_attempts {
            if report.attempts > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
            }
            report.attempts += 1;

            let response = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header("X-Webhook-Event", payload.event_type.as_str())
                .header("X-Webhook-Provider", self.settings.provider_label.as_str())
                .header("X-Webhook-Direction", payload.direction.as_str())
                .header("X-Webhook-Timestamp", timestamp.as_str())
                .header("X-Webhook-Signature", signature.as_str())
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    report.status = Some(resp.status().as_u16());
                    if resp.status().is_success() {
                        report.success = true;
                        break;
                    }
                    warn!(attempt = report.attempts, status = resp.status().as_u16(), "Merchant callback rejected");
                }
                Err(e) => {
                    warn!(attempt = report.attempts, error = %e, "Merchant callback failed");
                }
            }
        }

        get_metrics().record_notifier_delivery(report.success, report.attempts);
        Ok(report)
    }

    /// Fire-and-forget delivery on a background task.
    pub fn dispatch(self: &Arc<Self>, url: String, secret: String, payload: CallbackPayload) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match notifier.deliver(&url, &secret, &payload).await {
                Ok(report) if report.success => info!(
                    transaction_id = %payload.transaction_id,
                    direction = payload.direction.as_str(),
                    attempts = report.attempts,
                    "Merchant callback delivered"
                ),
                Ok(report) => warn!(
                    transaction_id = %payload.transaction_id,
                    attempts = report.attempts,
                    status = ?report.status,
                    "Merchant callback gave up"
                ),
                Err(e) => warn!(transaction_id = %payload.transaction_id, error = %e, "Merchant callback not sent"),
            }
        })
    }
}
