//! Order ledger access for the solver.
//!
//! The order ledger is the smart-contract-backed source of truth for order
//! state. The solver reads orders from it and writes exactly two things: its
//! auction commitment and the transaction id of its payout.

use alloy::primitives::U256;
use async_trait::async_trait;
use solver_types::{Order, OrderId, TransactionReceipt};
use thiserror::Error;

pub mod retry;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

/// Errors that can occur while talking to the order ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Transport or RPC failure.
	#[error("Network error: {0}")]
	Network(String),
	/// The ledger has no order with this id.
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The order id is not a valid ledger key.
	#[error("Invalid order id: {0}")]
	InvalidOrderId(String),
	/// The ledger response could not be decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The transaction was mined but reverted.
	#[error("Transaction reverted: {0}")]
	Reverted(String),
}

/// Read/write access to the order ledger.
#[async_trait]
pub trait OrderLedgerInterface: Send + Sync {
	/// Reads the current state of an order.
	async fn get_order(&self, order_id: &OrderId) -> Result<Order, LedgerError>;

	/// Commits the solver to an order at `price_e18`, naming the address the
	/// user should fund on the base network.
	async fn solver_react(
		&self,
		order_id: &OrderId,
		deposit_address: &str,
		price_e18: U256,
	) -> Result<TransactionReceipt, LedgerError>;

	/// Records the payout's destination-chain transaction id.
	async fn set_solver_tx_on_quote_network(
		&self,
		order_id: &OrderId,
		blockchain_tx_id: &str,
	) -> Result<TransactionReceipt, LedgerError>;
}
