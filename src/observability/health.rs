use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    /// Healthy, or degraded when the probe answered slower than `slow_ms`.
    fn from_latency(name: &str, latency_ms: f64, slow_ms: f64) -> Self {
        if latency_ms > slow_ms {
            Self {
                latency_ms: Some(latency_ms),
                ..Self::degraded(name, "High latency detected")
            }
        } else {
            Self::healthy(name, latency_ms)
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
    /// Cash-ins currently frozen under manual review.
    pub held_for_review: Option<i64>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
            held_for_review: None,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        if dependencies.iter().any(|d| d.status.is_unhealthy()) {
            HealthStatus::Unhealthy
        } else if dependencies.iter().any(|d| d.status.is_degraded()) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Probes Postgres, Redis and Kafka. Redis and Kafka are optional.
pub struct HealthChecker {
    pool: PgPool,
    redis_client: Option<redis::Client>,
    kafka_client: Option<Arc<rskafka::client::Client>>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(
        pool: PgPool,
        redis_client: Option<redis::Client>,
        kafka_client: Option<Arc<rskafka::client::Client>>,
    ) -> Self {
        Self {
            pool,
            redis_client,
            kafka_client,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![
            self.check_database().await,
            self.check_redis().await,
            self.check_kafka().await,
        ];

        let mut health = AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            dependencies,
        );
        health.held_for_review = self.count_held_for_review().await;
        health
    }

    pub async fn check_database(&self) -> DependencyHealth {
        let start = Instant::now();

        match tokio::time::timeout(PROBE_TIMEOUT, sqlx::query("SELECT 1").fetch_one(&self.pool)).await {
            Ok(Ok(_)) => DependencyHealth::from_latency("database", elapsed_ms(start), 100.0),
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    pub async fn check_redis(&self) -> DependencyHealth {
        let Some(client) = &self.redis_client else {
            return DependencyHealth::degraded("redis", "Redis not configured, dedupe uses Postgres only");
        };

        let start = Instant::now();
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => return DependencyHealth::unhealthy("redis", format!("Connection failed: {}", e)),
        };

        match tokio::time::timeout(PROBE_TIMEOUT, redis::cmd("PING").query_async::<_, ()>(&mut conn)).await {
            Ok(Ok(_)) => DependencyHealth::from_latency("redis", elapsed_ms(start), 50.0),
            Ok(Err(e)) => DependencyHealth::unhealthy("redis", format!("PING failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("redis", "PING timeout"),
        }
    }

    pub async fn check_kafka(&self) -> DependencyHealth {
        let Some(client) = &self.kafka_client else {
            return DependencyHealth::healthy("kafka", 0.0);
        };

        let start = Instant::now();
        match tokio::time::timeout(PROBE_TIMEOUT, client.list_topics()).await {
            Ok(Ok(_)) => DependencyHealth::from_latency("kafka", elapsed_ms(start), 200.0),
            Ok(Err(e)) => DependencyHealth::degraded("kafka", format!("Metadata request failed: {}", e)),
            Err(_) => DependencyHealth::degraded("kafka", "Metadata request timeout"),
        }
    }

    async fn count_held_for_review(&self) -> Option<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cash_in_transactions WHERE status = 'MED'")
            .fetch_one(&self.pool)
            .await
            .ok()
    }

    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready when Postgres answers. Redis loss only degrades dedupe.
    pub async fn is_ready(&self) -> bool {
        !self.check_database().await.status.is_unhealthy()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
