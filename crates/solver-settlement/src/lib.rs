//! Payout settlement for orders the solver won.
//!
//! The [`SettlementEngine`] turns an order awaiting the solver's payout into
//! a withdrawal on the custodial payment API and hands it to the
//! [`WithdrawalPoller`], which records the resulting chain transaction on
//! the order ledger.

use solver_custody::CustodyError;
use solver_ledger::LedgerError;
use thiserror::Error;

pub mod engine;
pub mod payout;
pub mod poller;

pub use engine::{SettleOutcome, SettlementEngine};
pub use poller::{PollOutcome, PollerConfig, WithdrawalPoller};

#[derive(Debug, Error)]
pub enum SettlementError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Custody error: {0}")]
	Custody(#[from] CustodyError),

	#[error("Payout arithmetic failed: {0}")]
	Arithmetic(String),

	#[error("Payout amount is zero")]
	ZeroPayout,

	/// Creation reported a duplicate but no job carries the external id.
	#[error("No withdrawal found for external id {0}")]
	WithdrawalNotFound(String),
}
