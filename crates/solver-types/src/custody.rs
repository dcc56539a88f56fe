//! Custodial payment API types.
//!
//! Assets and withdrawal jobs as reported by the payment provider. The
//! provider owns these records; the solver only creates withdrawals and
//! observes their progress.

use serde::{Deserialize, Serialize};

/// Sentinel token address used for the native asset of an EVM network.
pub const NATIVE_TOKEN_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Whether a leg's token address denotes the network's native asset.
pub fn is_native_token(token_address: &str) -> bool {
	let token = token_address.trim();
	token.is_empty()
		|| token.eq_ignore_ascii_case("native")
		|| token.eq_ignore_ascii_case(ZERO_ADDRESS)
		|| token.eq_ignore_ascii_case(NATIVE_TOKEN_SENTINEL)
}

/// An asset known to the payment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
	/// Payment-API asset identifier.
	pub id: String,
	/// Payment-API network identifier.
	pub network_id: String,
	/// Token contract address, absent for native assets.
	#[serde(default)]
	pub contract_address: Option<String>,
	pub decimals: u8,
	#[serde(default)]
	pub symbol: Option<String>,
}

/// Result of resolving an on-chain token to a payment-API asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
	pub asset_id: String,
	pub decimals: u8,
}

/// Provider-side lifecycle of a withdrawal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
	Submitted,
	PendingSignature,
	Broadcasting,
	Confirming,
	Completed,
	Failed,
	Rejected,
	Cancelled,
	#[serde(other)]
	Unknown,
}

impl WithdrawalStatus {
	/// The job stopped without moving funds.
	pub fn is_terminated(&self) -> bool {
		matches!(
			self,
			WithdrawalStatus::Failed | WithdrawalStatus::Rejected | WithdrawalStatus::Cancelled
		)
	}

	/// The job will not progress any further.
	pub fn is_terminal(&self) -> bool {
		self.is_terminated() || *self == WithdrawalStatus::Completed
	}
}

/// A withdrawal job tracked by the payment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalJob {
	/// Provider transaction identifier.
	pub id: String,
	/// Caller-supplied idempotency key.
	#[serde(default)]
	pub external_id: Option<String>,
	pub status: WithdrawalStatus,
	/// Destination-chain transaction id, set once the provider has broadcast.
	#[serde(default)]
	pub blockchain_tx_id: Option<String>,
}

impl WithdrawalJob {
	/// The destination-chain transaction id, if present and non-empty.
	pub fn chain_tx_id(&self) -> Option<&str> {
		self.blockchain_tx_id
			.as_deref()
			.map(str::trim)
			.filter(|id| !id.is_empty())
	}
}

/// Payload for creating a withdrawal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
	/// Source account the funds leave from.
	pub account_id: String,
	/// Idempotency key; see [`crate::OrderId::withdrawal_external_id`].
	pub external_id: String,
	pub asset_id: String,
	/// Decimal string at the asset's precision.
	pub amount: String,
	pub to_address: String,
}
