//! Order status dispatcher.

use solver_order::{AuctionReactor, ReactOutcome};
use solver_settlement::{SettleOutcome, SettlementEngine};
use solver_types::{truncate_id, OrderStatus, OrderStatusEvent};
use tracing::{debug, error, info};

/// What handling one event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
	Reacted(ReactOutcome),
	Settled(SettleOutcome),
	/// No component acts on this status.
	Ignored(OrderStatus),
	/// The handler failed; the error was logged.
	Failed(String),
}

/// Routes order status events to the component owning that lifecycle stage.
pub struct OrderProcessor {
	reactor: AuctionReactor,
	settlement: SettlementEngine,
}

impl OrderProcessor {
	pub fn new(reactor: AuctionReactor, settlement: SettlementEngine) -> Self {
		Self {
			reactor,
			settlement,
		}
	}

	pub fn settlement(&self) -> &SettlementEngine {
		&self.settlement
	}

	/// Handles one event. Never returns an error: failures are contained to
	/// the event that caused them.
	pub async fn handle(&self, event: &OrderStatusEvent) -> Dispatch {
		let short_id = truncate_id(event.order_id.as_str());
		debug!(order_id = %short_id, status = %event.status, "Handling order status event");

		match event.status {
			OrderStatus::UserInitiated | OrderStatus::AuctionInProgress => {
				match self.reactor.react(&event.order_id).await {
					Ok(outcome) => {
						if let ReactOutcome::Committed { tx_hash, .. } = &outcome {
							info!(
								order_id = %short_id,
								tx_hash = %truncate_id(&tx_hash.to_string()),
								"Reacted to order"
							);
						}
						Dispatch::Reacted(outcome)
					}
					Err(e) => {
						error!(order_id = %short_id, "Auction reaction failed: {}", e);
						Dispatch::Failed(e.to_string())
					}
				}
			}
			OrderStatus::WaitForSolverTx => match self.settlement.settle(&event.order_id).await {
				Ok(outcome) => Dispatch::Settled(outcome),
				Err(e) => {
					error!(order_id = %short_id, "Settlement failed: {}", e);
					Dispatch::Failed(e.to_string())
				}
			},
			status => {
				debug!(order_id = %short_id, status = %status, "No handler for status");
				Dispatch::Ignored(status)
			}
		}
	}
}
