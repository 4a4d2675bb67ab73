use thiserror::Error;

/// Postgres SQLSTATE codes that signal a transient condition worth redelivering.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[source] redis::RedisError),

    #[error("Kafka error: {0}")]
    Kafka(#[source] rskafka::client::error::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A record reached the ledger in a shape it can never legally have.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The owning account's fee settings produce an unusable net amount.
    #[error("Fee configuration error: {0}")]
    FeeConfiguration(String),

    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Maps a database error raised while waiting on a row lock.
    pub fn from_lock_error(err: sqlx::Error) -> Self {
        if sqlstate(&err).as_deref() == Some(LOCK_NOT_AVAILABLE) {
            AppError::LockTimeout(err.to_string())
        } else {
            AppError::Database(err)
        }
    }

    /// Returns true when the caller should ask the provider to redeliver.
    pub fn is_retriable(&self) -> bool {
        match self {
            AppError::LockTimeout(_) | AppError::Redis(_) => true,
            AppError::Database(err) => is_transient_db_error(err),
            _ => false,
        }
    }

    /// Stable code used in API responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::Kafka(_) => "EVENT_BUS_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ContractViolation(_) => "CONTRACT_VIOLATION",
            AppError::LockTimeout(_) => "LOCK_TIMEOUT",
            AppError::FeeConfiguration(_) => "FEE_CONFIGURATION",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(_) => matches!(
            sqlstate(err).as_deref(),
            Some(LOCK_NOT_AVAILABLE) | Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}
