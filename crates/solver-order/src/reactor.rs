//! Auction reactor.
//!
//! Reacts to orders in an early lifecycle state by committing the solver
//! on the order ledger. Every decision re-reads the order first: events are
//! hints and may be stale.

use crate::{BidStrategy, OrderError};
use alloy::primitives::U256;
use solver_custody::NetworkDirectory;
use solver_ledger::OrderLedgerInterface;
use solver_types::{now_secs, truncate_id, OrderId, SkipReason, TransactionHash};
use std::sync::Arc;
use tracing::{error, info};

/// What a reaction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactOutcome {
	/// Nothing to do for this order right now.
	Skipped(SkipReason),
	/// The commitment landed on the ledger.
	Committed {
		tx_hash: TransactionHash,
		price_e18: U256,
	},
	/// The ledger refused or the submission failed. Not retried.
	CommitFailed { reason: String },
}

pub struct AuctionReactor {
	ledger: Arc<dyn OrderLedgerInterface>,
	networks: Arc<NetworkDirectory>,
	strategy: Box<dyn BidStrategy>,
}

impl AuctionReactor {
	pub fn new(
		ledger: Arc<dyn OrderLedgerInterface>,
		networks: Arc<NetworkDirectory>,
		strategy: Box<dyn BidStrategy>,
	) -> Self {
		Self {
			ledger,
			networks,
			strategy,
		}
	}

	/// Commits the solver to `order_id` if the auction is still open.
	///
	/// Errors mean the order could not be read or the funding address could
	/// not be looked up; a failed commitment is reported as
	/// [`ReactOutcome::CommitFailed`] instead.
	pub async fn react(&self, order_id: &OrderId) -> Result<ReactOutcome, OrderError> {
		let order = self.ledger.get_order(order_id).await?;
		let short_id = truncate_id(order_id.as_str());

		if !order.status.accepts_reactions() {
			info!(order_id = %short_id, status = %order.status, "Order left the auction, skipping");
			return Ok(ReactOutcome::Skipped(SkipReason::StatusMismatch(
				order.status,
			)));
		}

		let deadline = order.auction_deadline();
		if now_secs() >= deadline {
			info!(order_id = %short_id, deadline, "Auction expired, skipping");
			return Ok(ReactOutcome::Skipped(SkipReason::AuctionExpired {
				deadline,
			}));
		}

		let network_id = &order.base.network_id;
		let Some(deposit_address) = self.networks.deposit_address(network_id).await? else {
			info!(order_id = %short_id, network = %network_id, "No funding address for network, skipping");
			return Ok(ReactOutcome::Skipped(SkipReason::UnsupportedNetwork(
				network_id.clone(),
			)));
		};

		let Some(price_e18) = self.strategy.price(&order).await else {
			info!(order_id = %short_id, "Bid strategy declined, skipping");
			return Ok(ReactOutcome::Skipped(SkipReason::NoBid));
		};

		info!(
			order_id = %short_id,
			price_e18 = %price_e18,
			deposit_address = %deposit_address,
			"Committing to order"
		);

		match self
			.ledger
			.solver_react(order_id, &deposit_address, price_e18)
			.await
		{
			Ok(receipt) => {
				info!(
					order_id = %short_id,
					tx_hash = %truncate_id(&receipt.hash.to_string()),
					block = receipt.block_number,
					"Commitment confirmed"
				);
				Ok(ReactOutcome::Committed {
					tx_hash: receipt.hash,
					price_e18,
				})
			}
			Err(e) => {
				error!(order_id = %short_id, "Commitment failed: {}", e);
				Ok(ReactOutcome::CommitFailed {
					reason: e.to_string(),
				})
			}
		}
	}
}
