//! Commits below the maximum price by a fixed number of basis points.

use crate::BidStrategy;
use alloy::primitives::U256;
use async_trait::async_trait;
use solver_types::Order;

const BPS_DENOMINATOR: u64 = 10_000;

pub struct DiscountStrategy {
	bps: u16,
}

impl DiscountStrategy {
	pub fn new(bps: u16) -> Self {
		Self { bps }
	}
}

#[async_trait]
impl BidStrategy for DiscountStrategy {
	async fn price(&self, order: &Order) -> Option<U256> {
		let keep = BPS_DENOMINATOR.checked_sub(u64::from(self.bps))?;
		let price = order
			.pricing
			.max_price_e18
			.checked_mul(U256::from(keep))?
			/ U256::from(BPS_DENOMINATOR);
		(!price.is_zero()).then_some(price)
	}
}
