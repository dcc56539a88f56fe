//! In-memory order ledger.
//!
//! Holds orders in a map and records every write the solver makes. Failure
//! injection lets tests exercise retry and error paths without a chain.

use crate::{LedgerError, OrderLedgerInterface};
use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use solver_types::{Order, OrderId, OrderStatus, TransactionHash, TransactionReceipt};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// A recorded `solverReact` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
	pub order_id: OrderId,
	pub deposit_address: String,
	pub price_e18: U256,
}

/// A recorded `setSolverTxOnQuoteNetwork` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
	pub order_id: OrderId,
	pub blockchain_tx_id: String,
}

#[derive(Default)]
pub struct InMemoryOrderLedger {
	orders: DashMap<OrderId, Order>,
	reactions: Mutex<Vec<Reaction>>,
	settlements: Mutex<Vec<SettlementRecord>>,
	failing_settlements: AtomicU32,
	reject_reactions: AtomicBool,
	block: AtomicU64,
}

impl InMemoryOrderLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_order(&self, order: Order) {
		self.orders.insert(order.id.clone(), order);
	}

	pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) {
		if let Some(mut order) = self.orders.get_mut(order_id) {
			order.status = status;
		}
	}

	pub fn set_solver(&self, order_id: &OrderId, solver: Option<Address>) {
		if let Some(mut order) = self.orders.get_mut(order_id) {
			order.solver = solver;
		}
	}

	pub fn order(&self, order_id: &OrderId) -> Option<Order> {
		self.orders.get(order_id).map(|entry| entry.clone())
	}

	pub fn reactions(&self) -> Vec<Reaction> {
		self.reactions
			.lock()
			.map(|r| r.clone())
			.unwrap_or_default()
	}

	pub fn settlements(&self) -> Vec<SettlementRecord> {
		self.settlements
			.lock()
			.map(|s| s.clone())
			.unwrap_or_default()
	}

	/// Makes the next `n` settlement recordings fail with a network error.
	pub fn fail_next_settlements(&self, n: u32) {
		self.failing_settlements.store(n, Ordering::SeqCst);
	}

	/// Makes every reaction revert while set.
	pub fn reject_reactions(&self, reject: bool) {
		self.reject_reactions.store(reject, Ordering::SeqCst);
	}

	fn receipt(&self, seed: String) -> TransactionReceipt {
		TransactionReceipt {
			hash: TransactionHash(keccak256(seed.as_bytes()).to_vec()),
			block_number: self.block.fetch_add(1, Ordering::SeqCst) + 1,
		}
	}

	fn take_failure(&self) -> bool {
		self.failing_settlements
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
	}
}

#[async_trait]
impl OrderLedgerInterface for InMemoryOrderLedger {
	async fn get_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
		self.order(order_id)
			.ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()))
	}

	async fn solver_react(
		&self,
		order_id: &OrderId,
		deposit_address: &str,
		price_e18: U256,
	) -> Result<TransactionReceipt, LedgerError> {
		if !self.orders.contains_key(order_id) {
			return Err(LedgerError::OrderNotFound(order_id.to_string()));
		}
		if self.reject_reactions.load(Ordering::SeqCst) {
			return Err(LedgerError::Reverted(format!("solverReact {}", order_id)));
		}

		let mut reactions = self
			.reactions
			.lock()
			.map_err(|_| LedgerError::Network("ledger state poisoned".to_string()))?;
		reactions.push(Reaction {
			order_id: order_id.clone(),
			deposit_address: deposit_address.to_string(),
			price_e18,
		});
		let seed = format!("react-{}-{}", order_id, reactions.len());
		drop(reactions);

		Ok(self.receipt(seed))
	}

	async fn set_solver_tx_on_quote_network(
		&self,
		order_id: &OrderId,
		blockchain_tx_id: &str,
	) -> Result<TransactionReceipt, LedgerError> {
		if !self.orders.contains_key(order_id) {
			return Err(LedgerError::OrderNotFound(order_id.to_string()));
		}
		if self.take_failure() {
			return Err(LedgerError::Network("connection reset".to_string()));
		}

		let mut settlements = self
			.settlements
			.lock()
			.map_err(|_| LedgerError::Network("ledger state poisoned".to_string()))?;
		settlements.push(SettlementRecord {
			order_id: order_id.clone(),
			blockchain_tx_id: blockchain_tx_id.to_string(),
		});
		let seed = format!("settle-{}-{}", order_id, settlements.len());
		drop(settlements);

		self.set_status(order_id, OrderStatus::Settled);
		Ok(self.receipt(seed))
	}
}
