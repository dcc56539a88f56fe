//! Solver signing identity.
//!
//! The solver owns exactly one signing key. It identifies the solver on the
//! order ledger (the `solver` field of orders it won) and signs every ledger
//! transaction the solver submits.

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

pub use implementations::local::{create_account, LocalWallet};

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Address that identifies the solver on the order ledger.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Wallet used by transaction-submitting providers.
	fn wallet(&self) -> EthereumWallet;
}
