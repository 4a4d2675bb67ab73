pub mod account_repository;
pub mod transaction_repository;
pub mod withdraw_repository;

pub use account_repository::AccountRepository;
pub use transaction_repository::{CashInReference, CashInUpdate, TransactionRepository};
pub use withdraw_repository::{WithdrawReference, WithdrawRepository, WithdrawUpdate};

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
