//! Auction participation for the solver.
//!
//! The [`AuctionReactor`] decides whether the solver commits to a newly
//! observed order and submits that commitment to the order ledger. How much
//! to bid is delegated to a [`BidStrategy`].

use alloy::primitives::U256;
use async_trait::async_trait;
use solver_custody::CustodyError;
use solver_ledger::LedgerError;
use solver_types::{BidPolicy, Order};
use thiserror::Error;

pub mod reactor;

/// Re-export implementations
pub mod implementations {
	pub mod strategies {
		pub mod discount;
		pub mod max_price;
	}
}

pub use reactor::{AuctionReactor, ReactOutcome};

/// Errors that abort an auction reaction before any commitment is attempted.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Custody error: {0}")]
	Custody(#[from] CustodyError),
}

/// Prices the solver's commitment to an order.
#[async_trait]
pub trait BidStrategy: Send + Sync {
	/// The 1e18-scaled price to commit at, or `None` to stay out of the auction.
	async fn price(&self, order: &Order) -> Option<U256>;
}

/// Builds the strategy selected by configuration.
pub fn create_strategy(policy: &BidPolicy) -> Box<dyn BidStrategy> {
	match policy {
		BidPolicy::MaxPrice => Box::new(implementations::strategies::max_price::MaxPriceStrategy),
		BidPolicy::Discount { bps } => Box::new(
			implementations::strategies::discount::DiscountStrategy::new(*bps),
		),
	}
}
