//! Order types for the solver system.
//!
//! This module defines the order record owned by the external order ledger,
//! its lifecycle status codes, and the status-change notifications delivered
//! by the event stream.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque order identifier as used by the order ledger.
///
/// On EVM ledgers this is the `0x`-prefixed hex encoding of a `bytes32`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Idempotency key used when creating the payout withdrawal for this order.
	///
	/// Deterministic so that a restarted process re-creating the withdrawal
	/// collides with the job it created before.
	pub fn withdrawal_external_id(&self) -> String {
		format!("{}-solver", self.0)
	}
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for OrderId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

/// Lifecycle status of an order on the ledger.
///
/// Orders move strictly forward through
/// `UserInitiated -> AuctionInProgress -> Matched -> WaitForSolverTx -> Settled`.
/// Codes the solver does not act on are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	UserInitiated,
	AuctionInProgress,
	Matched,
	WaitForSolverTx,
	Settled,
	Other(u8),
}

impl OrderStatus {
	/// Maps the ledger's on-chain status code.
	pub fn from_code(code: u8) -> Self {
		match code {
			1 => OrderStatus::UserInitiated,
			2 => OrderStatus::AuctionInProgress,
			3 => OrderStatus::Matched,
			4 => OrderStatus::WaitForSolverTx,
			5 => OrderStatus::Settled,
			other => OrderStatus::Other(other),
		}
	}

	pub fn code(&self) -> u8 {
		match self {
			OrderStatus::UserInitiated => 1,
			OrderStatus::AuctionInProgress => 2,
			OrderStatus::Matched => 3,
			OrderStatus::WaitForSolverTx => 4,
			OrderStatus::Settled => 5,
			OrderStatus::Other(code) => *code,
		}
	}

	/// Whether solvers may still commit to the order.
	pub fn accepts_reactions(&self) -> bool {
		matches!(
			self,
			OrderStatus::UserInitiated | OrderStatus::AuctionInProgress
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::UserInitiated => f.write_str("USER_INITIATED"),
			OrderStatus::AuctionInProgress => f.write_str("AUCTION_IN_PROGRESS"),
			OrderStatus::Matched => f.write_str("MATCHED"),
			OrderStatus::WaitForSolverTx => f.write_str("WAIT_FOR_SOLVER_TX"),
			OrderStatus::Settled => f.write_str("SETTLED"),
			OrderStatus::Other(code) => write!(f, "UNKNOWN({})", code),
		}
	}
}

/// The base leg: what the user supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseParams {
	/// Order-ledger network identifier of the base leg.
	pub network_id: String,
	/// Token contract address, or a native-asset sentinel.
	pub token_address: String,
	/// Address the user pays from.
	pub user_address: String,
	/// Amount in token-native units, when the ledger records it.
	pub amount: U256,
}

/// The quote leg: what the solver must deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteParams {
	pub network_id: String,
	pub token_address: String,
	/// Address receiving the solver's payout.
	pub recipient_address: String,
}

/// Pricing terms of an order.
///
/// Prices are fixed-point integers scaled by 1e18; amounts are token-native units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParams {
	pub max_price_e18: U256,
	pub price_e18: U256,
	pub base_amount: U256,
	pub quote_amount: U256,
	/// Auction window length in seconds, counted from `created_at`.
	pub auction_duration: u64,
}

/// An order as read from the order ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub id: OrderId,
	pub status: OrderStatus,
	/// Committed solver, `None` until a solver has won the order.
	pub solver: Option<Address>,
	pub base: BaseParams,
	pub quote: QuoteParams,
	pub pricing: PricingParams,
	/// Unix timestamp (seconds) of order creation.
	pub created_at: u64,
}

impl Order {
	/// Unix timestamp (seconds) after which the auction no longer accepts commitments.
	pub fn auction_deadline(&self) -> u64 {
		self.created_at.saturating_add(self.pricing.auction_duration)
	}

	/// Whether `solver` is the committed solver of this order.
	pub fn is_assigned_to(&self, solver: &Address) -> bool {
		self.solver.as_ref() == Some(solver)
	}
}

/// A status-change notification from the event stream.
///
/// Delivery is at-least-once and possibly stale: handlers treat it as a hint
/// to re-read the order, never as its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusEvent {
	pub order_id: OrderId,
	pub status: OrderStatus,
}

/// Reasons a handler decided not to act on an order.
///
/// These are expected outcomes of at-least-once delivery, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
	/// The order is no longer (or not yet) in a status the handler acts on.
	StatusMismatch(OrderStatus),
	/// The auction window closed at the given unix timestamp.
	AuctionExpired { deadline: u64 },
	/// No solver funding address is known for the network.
	UnsupportedNetwork(String),
	/// Another solver (or none) is committed to the order.
	NotAssignedSolver,
	/// A withdrawal poller is already running for the order.
	AlreadyPolling,
	/// The bid strategy declined to price the order.
	NoBid,
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SkipReason::StatusMismatch(status) => write!(f, "order status is {}", status),
			SkipReason::AuctionExpired { deadline } => {
				write!(f, "auction expired at {}", deadline)
			}
			SkipReason::UnsupportedNetwork(network) => {
				write!(f, "no funding address for network {}", network)
			}
			SkipReason::NotAssignedSolver => f.write_str("order is assigned to another solver"),
			SkipReason::AlreadyPolling => f.write_str("withdrawal already being polled"),
			SkipReason::NoBid => f.write_str("bid strategy declined the order"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		for code in 1..=5u8 {
			assert_eq!(OrderStatus::from_code(code).code(), code);
		}
		assert_eq!(OrderStatus::from_code(9), OrderStatus::Other(9));
		assert!(OrderStatus::UserInitiated.accepts_reactions());
		assert!(OrderStatus::AuctionInProgress.accepts_reactions());
		assert!(!OrderStatus::Matched.accepts_reactions());
		assert!(!OrderStatus::WaitForSolverTx.accepts_reactions());
	}

	#[test]
	fn test_withdrawal_external_id() {
		let id = OrderId::from("0xABC");
		assert_eq!(id.withdrawal_external_id(), "0xABC-solver");
	}

	#[test]
	fn test_auction_deadline_saturates() {
		let order = Order {
			id: OrderId::from("0x1"),
			status: OrderStatus::UserInitiated,
			solver: None,
			base: BaseParams {
				network_id: "ethereum".into(),
				token_address: String::new(),
				user_address: String::new(),
				amount: U256::ZERO,
			},
			quote: QuoteParams {
				network_id: "ethereum".into(),
				token_address: String::new(),
				recipient_address: String::new(),
			},
			pricing: PricingParams {
				max_price_e18: U256::ZERO,
				price_e18: U256::ZERO,
				base_amount: U256::ZERO,
				quote_amount: U256::ZERO,
				auction_duration: u64::MAX,
			},
			created_at: 100,
		};
		assert_eq!(order.auction_deadline(), u64::MAX);
	}
}
