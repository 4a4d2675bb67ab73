pub mod ledger_engine;
pub mod reconciliation_service;
pub mod state_machine;
pub mod transaction_finder;
pub mod wallet_policy;

pub use ledger_engine::{LedgerEngine, LedgerOutcome, StatusEvidence};
pub use reconciliation_service::{route_for_review, ReconciliationOutcome, ReconciliationService};
pub use state_machine::{CashInStateMachine, GuardDecision, WithdrawStateMachine};
pub use transaction_finder::{FoundRecord, MatchedBy, TransactionFinder};
pub use wallet_policy::{plan_cash_in, plan_withdraw, BalancePlan, WithdrawPlan};
