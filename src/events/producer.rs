use crate::config::KafkaSettings;
use crate::error::{AppError, Result};
use crate::events::types::{topics, LedgerEvent};
use crate::observability::get_metrics;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Sink for committed ledger changes.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &LedgerEvent) -> Result<()>;
}

/// Configuration for the Kafka publisher.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: topics::LEDGER.to_string(),
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

impl From<&KafkaSettings> for ProducerConfig {
    fn from(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings
                .brokers
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect(),
            topic: topics::qualified(&settings.topic_prefix, topics::LEDGER),
            ..Self::default()
        }
    }
}

/// Publishes ledger events to a single-partition Kafka topic.
pub struct KafkaEventPublisher {
    config: ProducerConfig,
    client: Arc<rskafka::client::Client>,
    partition: OnceCell<Arc<PartitionClient>>,
}

impl KafkaEventPublisher {
    /// Connects to the Kafka cluster.
    pub async fn connect(config: ProducerConfig) -> Result<Self> {
        info!(brokers = ?config.brokers, topic = %config.topic, "Connecting ledger event publisher");

        let client = ClientBuilder::new(config.brokers.clone())
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Failed to connect to Kafka: {}", e)))?;

        Ok(Self {
            config,
            client: Arc::new(client),
            partition: OnceCell::new(),
        })
    }

    /// Shared client, reused by the health checker.
    pub fn client(&self) -> Arc<rskafka::client::Client> {
        self.client.clone()
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    async fn partition_client(&self) -> Result<Arc<PartitionClient>> {
        self.partition
            .get_or_try_init(|| async {
                self.client
                    .partition_client(self.config.topic.clone(), 0, UnknownTopicHandling::Retry)
                    .await
                    .map(Arc::new)
                    .map_err(AppError::Kafka)
            })
            .await
            .cloned()
    }

    async fn send_raw(&self, key: String, payload: Vec<u8>) -> Result<i64> {
        let partition_client = self.partition_client().await?;

        let record = Record {
            key: Some(key.into_bytes()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let mut last_error = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                warn!(attempt, max = self.config.retry_count, "Retrying ledger event publish");
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_delay_ms * attempt as u64,
                ))
                .await;
            }

            match partition_client
                .produce(vec![record.clone()], Compression::NoCompression)
                .await
            {
                Ok(offsets) => {
                    let offset = offsets.first().copied().unwrap_or(0);
                    debug!(topic = %self.config.topic, offset, "Ledger event published");
                    return Ok(offset);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(AppError::Internal(anyhow!(
            "Failed to publish after {} retries: {:?}",
            self.config.retry_count,
            last_error
        )))
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &LedgerEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| AppError::Internal(anyhow!("Failed to serialize event: {}", e)))?;

        let result = self.send_raw(event.key(), payload).await;
        get_metrics().record_kafka_message(&self.config.topic, result.is_ok());
        result.map(|_| ())
    }
}
