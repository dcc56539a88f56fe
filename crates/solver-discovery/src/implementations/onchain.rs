//! On-chain discovery of order status changes.
//!
//! Polls the order ledger contract for `OrderStatusChanged` logs over new
//! block ranges and forwards them as [`OrderStatusEvent`]s.

use crate::{DiscoveryError, DiscoveryInterface};
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use solver_types::{truncate_id, OrderId, OrderStatus, OrderStatusEvent};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Upper bound on blocks covered by one `eth_getLogs` request.
const MAX_BLOCK_RANGE: u64 = 2_000;

sol! {
	/// Emitted by the order ledger on every status transition.
	event OrderStatusChanged(bytes32 indexed orderId, uint8 status);
}

/// Decodes a ledger log into a status event.
pub fn parse_status_log(log: &Log) -> Result<OrderStatusEvent, DiscoveryError> {
	let decoded = log
		.log_decode::<OrderStatusChanged>()
		.map_err(|e| DiscoveryError::Connection(format!("Failed to decode event: {}", e)))?;
	let event = decoded.inner.data;

	Ok(OrderStatusEvent {
		order_id: OrderId::new(event.orderId.to_string()),
		status: OrderStatus::from_code(event.status),
	})
}

/// Polls the order ledger for status-change logs.
pub struct LedgerEventDiscovery {
	provider: DynProvider,
	contract: Address,
	poll_interval: Duration,
	/// Last block whose logs were forwarded.
	last_block: Arc<Mutex<u64>>,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl LedgerEventDiscovery {
	/// Connects to the ledger's chain.
	///
	/// Scanning begins at `start_block` when given, otherwise after the
	/// current head.
	pub async fn new(
		rpc_url: &str,
		contract_address: &str,
		poll_interval: Duration,
		start_block: Option<u64>,
	) -> Result<Self, DiscoveryError> {
		let url: Url = rpc_url
			.parse()
			.map_err(|e| DiscoveryError::Connection(format!("Invalid RPC URL: {}", e)))?;
		let contract = Address::from_str(contract_address).map_err(|e| {
			DiscoveryError::Connection(format!("Invalid contract address: {}", e))
		})?;

		let provider = ProviderBuilder::new().connect_http(url).erased();

		let last_block = match start_block {
			Some(block) => block.saturating_sub(1),
			None => provider.get_block_number().await.map_err(|e| {
				DiscoveryError::Connection(format!("Failed to get block number: {}", e))
			})?,
		};

		Ok(Self {
			provider,
			contract,
			poll_interval,
			last_block: Arc::new(Mutex::new(last_block)),
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
		})
	}

	async fn monitoring_loop(
		provider: DynProvider,
		contract: Address,
		poll_interval: Duration,
		last_block: Arc<Mutex<u64>>,
		sender: mpsc::UnboundedSender<OrderStatusEvent>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(poll_interval);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let mut last_block_num = last_block.lock().await;

					let current_block = match provider.get_block_number().await {
						Ok(block) => block,
						Err(e) => {
							tracing::error!("Failed to get block number: {}", e);
							continue;
						}
					};

					if current_block <= *last_block_num {
						continue;
					}

					let from_block = *last_block_num + 1;
					let to_block = current_block.min(*last_block_num + MAX_BLOCK_RANGE);

					let filter = Filter::new()
						.address(contract)
						.event_signature(OrderStatusChanged::SIGNATURE_HASH)
						.from_block(from_block)
						.to_block(to_block);

					let logs = match provider.get_logs(&filter).await {
						Ok(logs) => logs,
						Err(e) => {
							tracing::warn!(from_block, to_block, "Failed to fetch logs: {}", e);
							continue;
						}
					};

					for log in logs {
						match parse_status_log(&log) {
							Ok(event) => {
								tracing::debug!(
									order_id = %truncate_id(event.order_id.as_str()),
									status = %event.status,
									"Discovered status change"
								);
								if sender.send(event).is_err() {
									tracing::info!("Event receiver closed, stopping discovery");
									return;
								}
							}
							Err(e) => tracing::warn!("Skipping malformed log: {}", e),
						}
					}

					*last_block_num = to_block;
				}
				_ = stop_rx.recv() => {
					break;
				}
			}
		}
	}
}

#[async_trait]
impl DiscoveryInterface for LedgerEventDiscovery {
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<OrderStatusEvent>,
	) -> Result<(), DiscoveryError> {
		if self.is_monitoring.swap(true, Ordering::SeqCst) {
			return Err(DiscoveryError::AlreadyMonitoring);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let provider = self.provider.clone();
		let contract = self.contract;
		let poll_interval = self.poll_interval;
		let last_block = self.last_block.clone();

		tokio::spawn(async move {
			Self::monitoring_loop(provider, contract, poll_interval, last_block, sender, stop_rx)
				.await;
		});

		tracing::info!(contract = %contract, "Started ledger event discovery");
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		if !self.is_monitoring.load(Ordering::SeqCst) {
			return Ok(());
		}

		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}

		self.is_monitoring.store(false, Ordering::SeqCst);
		Ok(())
	}
}
