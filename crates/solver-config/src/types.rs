//! Configuration types for the solver.

use serde::{Deserialize, Serialize};
use solver_types::{BidPolicy, ConfirmationPolicy};
use std::collections::HashMap;

/// Complete solver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Solver identity and credentials
	pub solver: SolverSettings,
	/// Order ledger contract access
	pub ledger: LedgerConfig,
	/// Order status event discovery
	#[serde(default)]
	pub discovery: DiscoveryConfig,
	/// Custodial payment API access
	pub custody: CustodyConfig,
	/// Auction participation
	#[serde(default)]
	pub auction: AuctionConfig,
	/// Payout withdrawal handling
	#[serde(default)]
	pub settlement: SettlementConfig,
	/// Per-network settings keyed by the order ledger's network id
	#[serde(default)]
	pub networks: HashMap<String, NetworkConfig>,
}

/// Solver identity and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverSettings {
	/// Solver name/identifier
	pub name: String,
	/// Hex-encoded signing key for ledger transactions
	pub private_key: String,
	/// Seconds to wait for in-flight work on shutdown
	#[serde(default = "default_shutdown_grace_secs")]
	pub shutdown_grace_secs: u64,
}

/// Order ledger contract access
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// HTTP JSON-RPC endpoint
	pub rpc_url: String,
	/// Order ledger contract address
	pub contract_address: String,
	/// Gas limit for solver transactions
	#[serde(default = "default_gas_limit")]
	pub gas_limit: u64,
	/// Confirmations awaited per submitted transaction
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
}

/// Order status event discovery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	/// Log polling interval in seconds
	#[serde(default = "default_discovery_poll_interval_secs")]
	pub poll_interval_secs: u64,
	/// First block to scan; the current head when unset
	#[serde(default)]
	pub start_block: Option<u64>,
}

impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: default_discovery_poll_interval_secs(),
			start_block: None,
		}
	}
}

/// Custodial payment API access
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustodyConfig {
	/// API base URL
	pub base_url: String,
	/// Bearer credential
	pub api_key: String,
	/// Workspace the solver account lives in
	pub workspace_id: String,
	/// Account funding payouts
	pub account_id: String,
	/// Per-request timeout in seconds
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
}

/// Auction participation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuctionConfig {
	#[serde(default)]
	pub bid_policy: BidPolicy,
}

/// Payout withdrawal handling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	/// Seconds between withdrawal status polls
	#[serde(default = "default_settlement_poll_interval_secs")]
	pub poll_interval_secs: u64,
	/// Polls before giving up on a withdrawal
	#[serde(default = "default_max_poll_attempts")]
	pub max_poll_attempts: u32,
	#[serde(default)]
	pub confirmation_policy: ConfirmationPolicy,
	/// Retries for recording the payout transaction on the ledger
	#[serde(default = "default_record_max_retries")]
	pub record_max_retries: u32,
	#[serde(default = "default_record_initial_backoff_ms")]
	pub record_initial_backoff_ms: u64,
	#[serde(default = "default_record_max_backoff_secs")]
	pub record_max_backoff_secs: u64,
}

impl Default for SettlementConfig {
	fn default() -> Self {
		Self {
			poll_interval_secs: default_settlement_poll_interval_secs(),
			max_poll_attempts: default_max_poll_attempts(),
			confirmation_policy: ConfirmationPolicy::default(),
			record_max_retries: default_record_max_retries(),
			record_initial_backoff_ms: default_record_initial_backoff_ms(),
			record_max_backoff_secs: default_record_max_backoff_secs(),
		}
	}
}

/// Per-network settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Payment-API network id; defaults to the ledger's network id
	#[serde(default)]
	pub custody_network: Option<String>,
	/// Solver funding address on this network
	#[serde(default)]
	pub deposit_address: Option<String>,
}

fn default_shutdown_grace_secs() -> u64 {
	30
}

fn default_gas_limit() -> u64 {
	500_000
}

fn default_confirmations() -> u64 {
	1
}

fn default_discovery_poll_interval_secs() -> u64 {
	3
}

fn default_request_timeout_secs() -> u64 {
	30
}

fn default_settlement_poll_interval_secs() -> u64 {
	2
}

fn default_max_poll_attempts() -> u32 {
	60
}

fn default_record_max_retries() -> u32 {
	5
}

fn default_record_initial_backoff_ms() -> u64 {
	500
}

fn default_record_max_backoff_secs() -> u64 {
	30
}
