use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub finder: FinderSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub dedupe: DedupeSettings,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic_prefix: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Bounds on how long a webhook may wait for an account row lock.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub lock_timeout_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 3000,
        }
    }
}

/// Tuning for the last-resort amount/time matching tier.
#[derive(Debug, Clone, Deserialize)]
pub struct FinderSettings {
    pub heuristic_window_hours: i64,
    pub amount_tolerance: Decimal,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            heuristic_window_hours: 72,
            amount_tolerance: Decimal::new(10, 2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub provider_label: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            max_retries: 2,
            retry_delay_ms: 300,
            provider_label: "pix-reconciliation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupeSettings {
    pub ttl_seconds: i64,
    pub key_prefix: String,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 86400,
            key_prefix: "webhook".to_string(),
        }
    }
}

/// Per-provider policy knobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Cash-ins above this gross amount are held for manual review even when
    /// the provider reports them as paid.
    pub review_threshold: Option<Decimal>,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Review thresholds keyed by lowercase provider name.
    pub fn review_thresholds(&self) -> HashMap<String, Decimal> {
        self.providers
            .iter()
            .filter_map(|(name, provider)| {
                provider
                    .review_threshold
                    .map(|threshold| (name.to_lowercase(), threshold))
            })
            .collect()
    }
}
