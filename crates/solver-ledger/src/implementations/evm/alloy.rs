//! Alloy-backed order ledger.
//!
//! Reads orders with `eth_call` and submits the solver's two write
//! operations as signed transactions against the order ledger contract.

use crate::{LedgerError, OrderLedgerInterface};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use solver_types::{
	truncate_id, BaseParams, Order, OrderId, OrderStatus, PricingParams, QuoteParams,
	TransactionHash, TransactionReceipt,
};
use std::str::FromStr;

// Solidity type definitions for the order ledger contract.
sol! {
	/// Base leg as stored by the ledger.
	struct LedgerBaseParams {
		string networkId;
		string tokenAddress;
		string userAddress;
		uint256 amount;
	}

	/// Quote leg as stored by the ledger.
	struct LedgerQuoteParams {
		string networkId;
		string tokenAddress;
		string recipientAddress;
	}

	/// Pricing terms, prices scaled by 1e18.
	struct LedgerPricingParams {
		uint256 maxPrice_e18;
		uint256 price_e18;
		uint256 baseAmount;
		uint256 quoteAmount;
		uint64 auctionDuration;
	}

	struct LedgerOrder {
		uint8 status;
		address solver;
		LedgerBaseParams baseParams;
		LedgerQuoteParams quoteParams;
		LedgerPricingParams pricingParams;
		uint64 createdAt;
	}

	interface IOrderLedger {
		function getOrder(bytes32 orderId) external view returns (LedgerOrder memory order);
		function solverReact(bytes32 orderId, string depositAddress, uint256 priceE18) external;
		function setSolverTxOnQuoteNetwork(bytes32 orderId, string txId) external;
	}
}

/// Parses a `0x`-prefixed bytes32 order id.
pub fn parse_order_id(order_id: &OrderId) -> Result<B256, LedgerError> {
	B256::from_str(order_id.as_str())
		.map_err(|e| LedgerError::InvalidOrderId(format!("{}: {}", order_id, e)))
}

fn into_order(order_id: &OrderId, raw: LedgerOrder) -> Result<Order, LedgerError> {
	// Unknown ids come back as the zero-valued struct.
	if raw.status == 0 && raw.createdAt == 0 {
		return Err(LedgerError::OrderNotFound(order_id.to_string()));
	}

	Ok(Order {
		id: order_id.clone(),
		status: OrderStatus::from_code(raw.status),
		solver: (raw.solver != Address::ZERO).then_some(raw.solver),
		base: BaseParams {
			network_id: raw.baseParams.networkId,
			token_address: raw.baseParams.tokenAddress,
			user_address: raw.baseParams.userAddress,
			amount: raw.baseParams.amount,
		},
		quote: QuoteParams {
			network_id: raw.quoteParams.networkId,
			token_address: raw.quoteParams.tokenAddress,
			recipient_address: raw.quoteParams.recipientAddress,
		},
		pricing: PricingParams {
			max_price_e18: raw.pricingParams.maxPrice_e18,
			price_e18: raw.pricingParams.price_e18,
			base_amount: raw.pricingParams.baseAmount,
			quote_amount: raw.pricingParams.quoteAmount,
			auction_duration: raw.pricingParams.auctionDuration,
		},
		created_at: raw.createdAt,
	})
}

/// Alloy-based order ledger client.
///
/// The provider carries the solver wallet, so every submitted transaction is
/// signed with the solver's key.
pub struct AlloyOrderLedger {
	provider: DynProvider,
	contract: Address,
	gas_limit: u64,
	confirmations: u64,
}

impl AlloyOrderLedger {
	pub fn new(
		rpc_url: &str,
		contract_address: &str,
		wallet: EthereumWallet,
		gas_limit: u64,
		confirmations: u64,
	) -> Result<Self, LedgerError> {
		let url: Url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Network(format!("Invalid RPC URL: {}", e)))?;

		let contract = Address::from_str(contract_address)
			.map_err(|e| LedgerError::Network(format!("Invalid contract address: {}", e)))?;

		let provider = ProviderBuilder::new()
			.wallet(wallet)
			.connect_http(url)
			.erased();

		Ok(Self {
			provider,
			contract,
			gas_limit,
			confirmations,
		})
	}

	async fn submit(&self, input: Vec<u8>, label: &str) -> Result<TransactionReceipt, LedgerError> {
		let request = TransactionRequest::default()
			.with_to(self.contract)
			.with_input(input)
			.with_gas_limit(self.gas_limit);

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| LedgerError::Network(format!("Failed to send {}: {}", label, e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(tx_hash = %truncate_id(&tx_hash.to_string()), "Submitted {}", label);

		let receipt = pending
			.with_required_confirmations(self.confirmations)
			.get_receipt()
			.await
			.map_err(|e| {
				LedgerError::Network(format!("Failed to confirm {} {}: {}", label, tx_hash, e))
			})?;

		if !receipt.status() {
			return Err(LedgerError::Reverted(format!("{} {}", label, tx_hash)));
		}

		Ok(TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0.to_vec()),
			block_number: receipt.block_number.unwrap_or(0),
		})
	}
}

#[async_trait]
impl OrderLedgerInterface for AlloyOrderLedger {
	async fn get_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
		let call = IOrderLedger::getOrderCall {
			orderId: parse_order_id(order_id)?,
		};
		let request = TransactionRequest::default()
			.with_to(self.contract)
			.with_input(call.abi_encode());

		let output = self
			.provider
			.call(request)
			.await
			.map_err(|e| LedgerError::Network(format!("getOrder failed: {}", e)))?;

		let raw = IOrderLedger::getOrderCall::abi_decode_returns(&output)
			.map_err(|e| LedgerError::Decode(format!("getOrder returned bad data: {}", e)))?;

		into_order(order_id, raw)
	}

	async fn solver_react(
		&self,
		order_id: &OrderId,
		deposit_address: &str,
		price_e18: U256,
	) -> Result<TransactionReceipt, LedgerError> {
		let call = IOrderLedger::solverReactCall {
			orderId: parse_order_id(order_id)?,
			depositAddress: deposit_address.to_string(),
			priceE18: price_e18,
		};
		self.submit(call.abi_encode(), "solverReact").await
	}

	async fn set_solver_tx_on_quote_network(
		&self,
		order_id: &OrderId,
		blockchain_tx_id: &str,
	) -> Result<TransactionReceipt, LedgerError> {
		let call = IOrderLedger::setSolverTxOnQuoteNetworkCall {
			orderId: parse_order_id(order_id)?,
			txId: blockchain_tx_id.to_string(),
		};
		self.submit(call.abi_encode(), "setSolverTxOnQuoteNetwork")
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::sol_types::SolValue;

	fn raw_order() -> LedgerOrder {
		LedgerOrder {
			status: 4,
			solver: Address::repeat_byte(0x11),
			baseParams: LedgerBaseParams {
				networkId: "ethereum".into(),
				tokenAddress: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
				userAddress: "0xuser".into(),
				amount: U256::from(1_000_000u64),
			},
			quoteParams: LedgerQuoteParams {
				networkId: "bitcoin".into(),
				tokenAddress: "native".into(),
				recipientAddress: "bc1qrecipient".into(),
			},
			pricingParams: LedgerPricingParams {
				maxPrice_e18: U256::from(3u64),
				price_e18: U256::from(2u64),
				baseAmount: U256::from(1_000_000u64),
				quoteAmount: U256::ZERO,
				auctionDuration: 60,
			},
			createdAt: 1_700_000_000,
		}
	}

	#[test]
	fn test_parse_order_id() {
		let id = OrderId::from("0x0000000000000000000000000000000000000000000000000000000000000abc");
		let mut expected = [0u8; 32];
		expected[30] = 0x0a;
		expected[31] = 0xbc;
		assert_eq!(parse_order_id(&id).unwrap(), B256::from(expected));
		assert!(matches!(
			parse_order_id(&OrderId::from("0xABC")),
			Err(LedgerError::InvalidOrderId(_))
		));
	}

	#[test]
	fn test_into_order_maps_fields() {
		let id = OrderId::from("0x01");
		let order = into_order(&id, raw_order()).unwrap();

		assert_eq!(order.status, OrderStatus::WaitForSolverTx);
		assert_eq!(order.solver, Some(Address::repeat_byte(0x11)));
		assert_eq!(order.quote.network_id, "bitcoin");
		assert_eq!(order.pricing.price_e18, U256::from(2u64));
		assert_eq!(order.auction_deadline(), 1_700_000_060);
	}

	#[test]
	fn test_zero_solver_is_none() {
		let mut raw = raw_order();
		raw.solver = Address::ZERO;
		let order = into_order(&OrderId::from("0x01"), raw).unwrap();
		assert_eq!(order.solver, None);
	}

	#[test]
	fn test_empty_struct_is_not_found() {
		let mut raw = raw_order();
		raw.status = 0;
		raw.createdAt = 0;
		assert!(matches!(
			into_order(&OrderId::from("0x01"), raw),
			Err(LedgerError::OrderNotFound(_))
		));
	}

	#[test]
	fn test_get_order_return_roundtrip() {
		let encoded = raw_order().abi_encode();
		let decoded = IOrderLedger::getOrderCall::abi_decode_returns(&encoded).unwrap();
		assert_eq!(decoded.createdAt, 1_700_000_000);
		assert_eq!(decoded.quoteParams.recipientAddress, "bc1qrecipient");
	}
}
