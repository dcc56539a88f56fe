//! Custodial payment API access.
//!
//! The payment API holds the solver's funds and moves them on request. This
//! crate defines the seam the settlement flow talks through, an HTTP client
//! for it, an in-memory stand-in, and the two lookups built on top: the
//! per-network directory and the cached token/asset resolver.

use async_trait::async_trait;
use solver_types::{Asset, WithdrawalJob, WithdrawalRequest};
use thiserror::Error;

pub mod networks;
pub mod resolver;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod memory;
}

pub use networks::NetworkDirectory;
pub use resolver::AssetResolver;

/// Errors returned by the payment API or the lookups built on it.
#[derive(Debug, Error)]
pub enum CustodyError {
	#[error("Network error: {0}")]
	Network(String),

	#[error("HTTP {status}: {body}")]
	Http { status: u16, body: String },

	/// A transaction with the same external id already exists.
	#[error("Transaction already exists: {0}")]
	AlreadyExists(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("No asset for token {token} on network {network}")]
	AssetNotFound { network: String, token: String },

	#[error("{count} assets match token {token} on network {network}")]
	AmbiguousAsset {
		network: String,
		token: String,
		count: usize,
	},

	#[error("Decode error: {0}")]
	Decode(String),
}

impl CustodyError {
	/// Whether retrying the same request could succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			CustodyError::Network(_) => true,
			CustodyError::Http { status, .. } => *status == 429 || *status >= 500,
			_ => false,
		}
	}
}

/// Operations the solver needs from the payment API.
#[async_trait]
pub trait CustodyInterface: Send + Sync {
	/// Asset id of a network's native currency.
	async fn native_asset_id(&self, network_id: &str) -> Result<String, CustodyError>;

	async fn asset(&self, asset_id: &str) -> Result<Asset, CustodyError>;

	/// Assets on `network_id` whose contract address matches, case-insensitively.
	async fn find_assets(
		&self,
		network_id: &str,
		contract_address: &str,
	) -> Result<Vec<Asset>, CustodyError>;

	/// Creates a withdrawal job.
	///
	/// Fails with [`CustodyError::AlreadyExists`] when a job with the same
	/// external id exists.
	async fn create_transaction(
		&self,
		request: &WithdrawalRequest,
	) -> Result<WithdrawalJob, CustodyError>;

	async fn get_transactions(
		&self,
		account_id: &str,
		external_id: &str,
	) -> Result<Vec<WithdrawalJob>, CustodyError>;

	async fn get_transaction(&self, transaction_id: &str) -> Result<WithdrawalJob, CustodyError>;

	/// The account's deposit address on a network, if it has one.
	async fn deposit_address(
		&self,
		account_id: &str,
		network_id: &str,
	) -> Result<Option<String>, CustodyError>;
}
