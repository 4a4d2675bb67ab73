use pix_reconciliation::api::{create_router, AppState};
use pix_reconciliation::config::Settings;
use pix_reconciliation::events::{EventPublisher, KafkaEventPublisher, ProducerConfig};
use pix_reconciliation::idempotency::{DeliveryCleanupJob, DeliveryDeduplicator};
use pix_reconciliation::notifier::WebhookNotifier;
use pix_reconciliation::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use pix_reconciliation::services::{LedgerEngine, ReconciliationService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DELIVERY_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application))?;
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // Connect to PostgreSQL
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // Redis only fronts delivery dedupe, so a bad URL degrades instead of aborting.
    let redis_client = match redis::Client::open(settings.redis.url.as_str()) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Redis disabled, delivery dedupe will use Postgres only");
            None
        }
    };

    let mut kafka_client = None;
    let mut publisher: Option<Arc<dyn EventPublisher>> = None;
    if settings.kafka.enabled {
        match KafkaEventPublisher::connect(ProducerConfig::from(&settings.kafka)).await {
            Ok(kafka) => {
                info!(topic = kafka.topic(), "Ledger event publisher ready");
                kafka_client = Some(kafka.client());
                publisher = Some(Arc::new(kafka));
            }
            Err(e) => warn!(error = %e, "Kafka unavailable, ledger events will not be published"),
        }
    }

    let notifier = Arc::new(WebhookNotifier::new(settings.notifier.clone())?);
    let mut engine = LedgerEngine::new(pool.clone(), settings.ledger.clone()).with_notifier(notifier);
    if let Some(publisher) = publisher {
        engine = engine.with_publisher(publisher);
    }

    let reconciliation = Arc::new(ReconciliationService::new(
        pool.clone(),
        Arc::new(engine),
        settings.finder.clone(),
        settings.review_thresholds(),
    ));

    let deduplicator = Arc::new(DeliveryDeduplicator::new(
        pool.clone(),
        redis_client.clone(),
        settings.dedupe.clone(),
    ));
    DeliveryCleanupJob::new(Arc::clone(&deduplicator), DELIVERY_CLEANUP_INTERVAL_SECS).start();

    let health_checker = Arc::new(HealthChecker::new(pool.clone(), redis_client, kafka_client));

    let state = AppState::new(pool, reconciliation, deduplicator, health_checker).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "PIX reconciliation service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
