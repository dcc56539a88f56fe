//! Per-network settings the solver needs around the payment API.

use crate::{CustodyError, CustodyInterface};
use solver_config::NetworkConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps order-ledger network ids to payment-API network ids and finds the
/// solver's funding address on each network.
///
/// Configured deposit addresses win; otherwise the payment API is asked for
/// the solver account's address on that network.
pub struct NetworkDirectory {
	networks: HashMap<String, NetworkConfig>,
	custody: Arc<dyn CustodyInterface>,
	account_id: String,
}

impl NetworkDirectory {
	pub fn new(
		networks: HashMap<String, NetworkConfig>,
		custody: Arc<dyn CustodyInterface>,
		account_id: impl Into<String>,
	) -> Self {
		Self {
			networks,
			custody,
			account_id: account_id.into(),
		}
	}

	/// Payment-API network id for an order-ledger network id.
	pub fn custody_network<'a>(&'a self, network_id: &'a str) -> &'a str {
		self.networks
			.get(network_id)
			.and_then(|n| n.custody_network.as_deref())
			.unwrap_or(network_id)
	}

	/// The solver's deposit address on `network_id`, if it has one.
	pub async fn deposit_address(&self, network_id: &str) -> Result<Option<String>, CustodyError> {
		if let Some(address) = self
			.networks
			.get(network_id)
			.and_then(|n| n.deposit_address.as_ref())
			.filter(|a| !a.trim().is_empty())
		{
			return Ok(Some(address.clone()));
		}

		let custody_network = self.custody_network(network_id);
		debug!(
			network = %network_id,
			custody_network = %custody_network,
			"No configured deposit address, asking payment API"
		);
		self.custody
			.deposit_address(&self.account_id, custody_network)
			.await
	}
}
