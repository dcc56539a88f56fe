//! Commits at the order's maximum acceptable price.

use crate::BidStrategy;
use alloy::primitives::U256;
use async_trait::async_trait;
use solver_types::Order;

/// Bids the order's `maxPrice_e18` unchanged.
///
/// An order without a maximum price gets no bid.
pub struct MaxPriceStrategy;

#[async_trait]
impl BidStrategy for MaxPriceStrategy {
	async fn price(&self, order: &Order) -> Option<U256> {
		let max_price = order.pricing.max_price_e18;
		(!max_price.is_zero()).then_some(max_price)
	}
}
