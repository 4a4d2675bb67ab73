pub mod account;
pub mod fee;
pub mod status;
pub mod transaction;
pub mod withdraw;

pub use account::{Account, AccountBalances};
pub use fee::{round_cents, AccountFeeConfig, FeeMode};
pub use status::{CanonicalStatus, WithdrawStatus};
pub use transaction::{CashInTransaction, Direction, WalletFootprint};
pub use withdraw::Withdraw;
