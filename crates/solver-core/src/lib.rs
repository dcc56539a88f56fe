//! Solver engine.
//!
//! Wires the order ledger, the payment API and the event stream into an
//! [`OrderProcessor`] and drives it from discovered status events until the
//! stream ends or shutdown is requested.

use solver_account::create_account;
use solver_config::Config;
use solver_custody::implementations::http::HttpCustodyClient;
use solver_custody::{AssetResolver, CustodyInterface, NetworkDirectory};
use solver_discovery::implementations::onchain::LedgerEventDiscovery;
use solver_discovery::DiscoveryInterface;
use solver_ledger::implementations::evm::alloy::AlloyOrderLedger;
use solver_ledger::retry::RetryPolicy;
use solver_ledger::OrderLedgerInterface;
use solver_order::{create_strategy, AuctionReactor};
use solver_settlement::{PollerConfig, SettlementEngine, WithdrawalPoller};
use solver_types::{truncate_id, AlertSink, LogAlertSink, OrderId, OrderStatusEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub mod processor;

pub use processor::{Dispatch, OrderProcessor};

#[derive(Debug, Error)]
pub enum SolverError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

pub struct SolverEngine {
	processor: Arc<OrderProcessor>,
	poller: Arc<WithdrawalPoller>,
	ledger: Arc<dyn OrderLedgerInterface>,
	discovery: Arc<dyn DiscoveryInterface>,
	shutdown_grace: Duration,
}

impl SolverEngine {
	/// Processes discovered events until the stream closes or `shutdown`
	/// resolves.
	///
	/// On shutdown, discovery stops first, in-flight handlers get
	/// `shutdown_grace` to finish their ledger submissions, then background
	/// withdrawal polls are interrupted. When the stream closes on its own,
	/// every handler and poll runs to completion.
	pub async fn run<F>(&self, shutdown: F) -> Result<(), SolverError>
	where
		F: Future<Output = ()>,
	{
		let (event_tx, mut event_rx) = mpsc::unbounded_channel();
		self.discovery
			.start_monitoring(event_tx)
			.await
			.map_err(|e| SolverError::Service(e.to_string()))?;

		let mut handlers = JoinSet::new();
		tokio::pin!(shutdown);

		let interrupted = loop {
			tokio::select! {
				event = event_rx.recv() => match event {
					Some(event) => self.dispatch(&mut handlers, event),
					None => break false,
				},

				Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
					if let Err(e) = joined {
						if e.is_panic() {
							error!("Event handler panicked: {}", e);
						}
					}
				}

				_ = &mut shutdown => break true,
			}
		};

		if interrupted {
			info!("Shutting down solver");
			if let Err(e) = self.discovery.stop_monitoring().await {
				warn!("Failed to stop discovery: {}", e);
			}
			drop(event_rx);

			if tokio::time::timeout(self.shutdown_grace, drain(&mut handlers))
				.await
				.is_err()
			{
				warn!(
					"Event handlers still running after {:?}, aborting",
					self.shutdown_grace
				);
				handlers.abort_all();
			}
			self.poller.shutdown(self.shutdown_grace).await;
		} else {
			info!("Event stream closed, waiting for in-flight work");
			drain(&mut handlers).await;
			self.poller.wait_idle().await;
		}

		info!("Solver stopped");
		Ok(())
	}

	/// Dispatches an order at its current ledger status and waits for any
	/// withdrawal poll this started.
	pub async fn replay(&self, order_id: &OrderId) -> Result<Dispatch, SolverError> {
		let order = self
			.ledger
			.get_order(order_id)
			.await
			.map_err(|e| SolverError::Service(e.to_string()))?;

		info!(
			order_id = %truncate_id(order_id.as_str()),
			status = %order.status,
			"Replaying order"
		);
		let dispatch = self
			.processor
			.handle(&OrderStatusEvent {
				order_id: order_id.clone(),
				status: order.status,
			})
			.await;
		self.poller.wait_idle().await;

		Ok(dispatch)
	}

	pub fn processor(&self) -> &Arc<OrderProcessor> {
		&self.processor
	}

	pub fn poller(&self) -> &Arc<WithdrawalPoller> {
		&self.poller
	}

	fn dispatch(&self, handlers: &mut JoinSet<()>, event: OrderStatusEvent) {
		let processor = self.processor.clone();
		handlers.spawn(async move {
			processor.handle(&event).await;
		});
	}
}

async fn drain(handlers: &mut JoinSet<()>) {
	while let Some(joined) = handlers.join_next().await {
		if let Err(e) = joined {
			if e.is_panic() {
				error!("Event handler panicked: {}", e);
			}
		}
	}
}

/// Builds a [`SolverEngine`] from configuration.
///
/// External services default to the implementations named by the config;
/// any of them can be replaced before [`SolverBuilder::build`].
pub struct SolverBuilder {
	config: Config,
	ledger: Option<Arc<dyn OrderLedgerInterface>>,
	custody: Option<Arc<dyn CustodyInterface>>,
	discovery: Option<Arc<dyn DiscoveryInterface>>,
	alerts: Option<Arc<dyn AlertSink>>,
	poller_config: Option<PollerConfig>,
}

impl SolverBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			ledger: None,
			custody: None,
			discovery: None,
			alerts: None,
			poller_config: None,
		}
	}

	pub fn with_ledger(mut self, ledger: Arc<dyn OrderLedgerInterface>) -> Self {
		self.ledger = Some(ledger);
		self
	}

	pub fn with_custody(mut self, custody: Arc<dyn CustodyInterface>) -> Self {
		self.custody = Some(custody);
		self
	}

	pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryInterface>) -> Self {
		self.discovery = Some(discovery);
		self
	}

	pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
		self.alerts = Some(alerts);
		self
	}

	/// Overrides the poll timing derived from `[settlement]`.
	pub fn with_poller_config(mut self, poller_config: PollerConfig) -> Self {
		self.poller_config = Some(poller_config);
		self
	}

	pub async fn build(self) -> Result<SolverEngine, SolverError> {
		let config = self.config;

		let account = create_account(&config.solver.private_key)
			.map_err(|e| SolverError::Config(e.to_string()))?;
		let solver_address = account
			.address()
			.await
			.map_err(|e| SolverError::Config(e.to_string()))?;
		info!(solver = %solver_address, name = %config.solver.name, "Solver identity loaded");

		let ledger: Arc<dyn OrderLedgerInterface> = match self.ledger {
			Some(ledger) => ledger,
			None => Arc::new(
				AlloyOrderLedger::new(
					&config.ledger.rpc_url,
					&config.ledger.contract_address,
					account.wallet(),
					config.ledger.gas_limit,
					config.ledger.confirmations,
				)
				.map_err(|e| SolverError::Config(e.to_string()))?,
			),
		};

		let custody: Arc<dyn CustodyInterface> = match self.custody {
			Some(custody) => custody,
			None => Arc::new(
				HttpCustodyClient::new(
					&config.custody.base_url,
					&config.custody.api_key,
					&config.custody.workspace_id,
					Duration::from_secs(config.custody.request_timeout_secs),
				)
				.map_err(|e| SolverError::Config(e.to_string()))?,
			),
		};

		let discovery: Arc<dyn DiscoveryInterface> = match self.discovery {
			Some(discovery) => discovery,
			None => Arc::new(
				LedgerEventDiscovery::new(
					&config.ledger.rpc_url,
					&config.ledger.contract_address,
					Duration::from_secs(config.discovery.poll_interval_secs),
					config.discovery.start_block,
				)
				.await
				.map_err(|e| SolverError::Service(e.to_string()))?,
			),
		};

		let alerts: Arc<dyn AlertSink> = match self.alerts {
			Some(alerts) => alerts,
			None => Arc::new(LogAlertSink),
		};

		let poller_config = self.poller_config.unwrap_or_else(|| PollerConfig {
			interval: Duration::from_secs(config.settlement.poll_interval_secs),
			max_attempts: config.settlement.max_poll_attempts,
			confirmation: config.settlement.confirmation_policy,
			record_retry: RetryPolicy {
				max_retries: config.settlement.record_max_retries,
				initial_interval: Duration::from_millis(config.settlement.record_initial_backoff_ms),
				max_interval: Duration::from_secs(config.settlement.record_max_backoff_secs),
			},
		});

		let networks = Arc::new(NetworkDirectory::new(
			config.networks.clone(),
			custody.clone(),
			config.custody.account_id.clone(),
		));
		let resolver = Arc::new(AssetResolver::new(custody.clone(), networks.clone()));
		let poller = Arc::new(WithdrawalPoller::new(
			custody.clone(),
			ledger.clone(),
			alerts.clone(),
			poller_config,
		));

		let reactor = AuctionReactor::new(
			ledger.clone(),
			networks,
			create_strategy(&config.auction.bid_policy),
		);
		let settlement = SettlementEngine::new(
			ledger.clone(),
			custody,
			resolver,
			poller.clone(),
			alerts,
			solver_address,
			config.custody.account_id.clone(),
		);

		Ok(SolverEngine {
			processor: Arc::new(OrderProcessor::new(reactor, settlement)),
			poller,
			ledger,
			discovery,
			shutdown_grace: Duration::from_secs(config.solver.shutdown_grace_secs),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Address, U256};
	use solver_config::ConfigLoader;
	use solver_custody::implementations::memory::InMemoryCustody;
	use solver_discovery::implementations::replay::ReplayDiscovery;
	use solver_discovery::DiscoveryError;
	use solver_ledger::implementations::memory::InMemoryOrderLedger;
	use solver_order::ReactOutcome;
	use solver_settlement::SettleOutcome;
	use solver_types::{
		now_secs, Asset, BaseParams, ConfirmationPolicy, Order, OrderStatus, PricingParams,
		QuoteParams, RecordingAlertSink, SkipReason, WithdrawalStatus,
	};
	use std::str::FromStr;
	use tokio::sync::{oneshot, Mutex};

	// Address of the anvil development key below.
	const SOLVER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
	const MAX_PRICE: u128 = 2_000_000_000_000_000_000;

	const CONFIG: &str = r#"
[solver]
name = "test-solver"
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
shutdown_grace_secs = 1

[ledger]
rpc_url = "http://localhost:8545"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[custody]
base_url = "https://custody.example.com"
api_key = "key"
workspace_id = "ws-1"
account_id = "acct-1"

[networks.ethereum]
custody_network = "ETH"
deposit_address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"

[networks.bitcoin]
custody_network = "BTC"
"#;

	/// Holds the event sender open until discovery is stopped.
	#[derive(Default)]
	struct HeldDiscovery {
		events: Vec<OrderStatusEvent>,
		sender: Mutex<Option<mpsc::UnboundedSender<OrderStatusEvent>>>,
	}

	#[async_trait::async_trait]
	impl DiscoveryInterface for HeldDiscovery {
		async fn start_monitoring(
			&self,
			sender: mpsc::UnboundedSender<OrderStatusEvent>,
		) -> Result<(), DiscoveryError> {
			for event in &self.events {
				let _ = sender.send(event.clone());
			}
			*self.sender.lock().await = Some(sender);
			Ok(())
		}

		async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
			self.sender.lock().await.take();
			Ok(())
		}
	}

	struct Harness {
		ledger: Arc<InMemoryOrderLedger>,
		custody: Arc<InMemoryCustody>,
		alerts: Arc<RecordingAlertSink>,
	}

	impl Harness {
		fn new() -> Self {
			let custody = Arc::new(InMemoryCustody::new());
			custody.add_native_asset(Asset {
				id: "BTC".into(),
				network_id: "BTC".into(),
				contract_address: None,
				decimals: 8,
				symbol: Some("BTC".into()),
			});
			custody.add_native_asset(Asset {
				id: "ETH".into(),
				network_id: "ETH".into(),
				contract_address: None,
				decimals: 18,
				symbol: Some("ETH".into()),
			});
			Self {
				ledger: Arc::new(InMemoryOrderLedger::new()),
				custody,
				alerts: Arc::new(RecordingAlertSink::new()),
			}
		}

		async fn engine(&self, discovery: Arc<dyn DiscoveryInterface>) -> SolverEngine {
			self.engine_with_attempts(discovery, 20).await
		}

		async fn engine_with_attempts(
			&self,
			discovery: Arc<dyn DiscoveryInterface>,
			max_attempts: u32,
		) -> SolverEngine {
			let config = ConfigLoader::new().parse(CONFIG).unwrap();
			SolverBuilder::new(config)
				.with_ledger(self.ledger.clone())
				.with_custody(self.custody.clone())
				.with_discovery(discovery)
				.with_alert_sink(self.alerts.clone())
				.with_poller_config(PollerConfig {
					interval: Duration::from_millis(1),
					max_attempts,
					confirmation: ConfirmationPolicy::RequireCompleted,
					record_retry: RetryPolicy {
						max_retries: 2,
						initial_interval: Duration::from_millis(1),
						max_interval: Duration::from_millis(1),
					},
				})
				.build()
				.await
				.unwrap()
		}
	}

	fn solver() -> Address {
		Address::from_str(SOLVER).unwrap()
	}

	// 0.05 ETH sold for BTC at 0.03 BTC per ETH.
	fn order(id: &str, status: OrderStatus) -> Order {
		Order {
			id: OrderId::from(id),
			status,
			solver: None,
			base: BaseParams {
				network_id: "ethereum".into(),
				token_address: "native".into(),
				user_address: "0xuser".into(),
				amount: U256::from(50_000_000_000_000_000u128),
			},
			quote: QuoteParams {
				network_id: "bitcoin".into(),
				token_address: "native".into(),
				recipient_address: "bc1qrecipient".into(),
			},
			pricing: PricingParams {
				max_price_e18: U256::from(MAX_PRICE),
				price_e18: U256::from(30_000_000_000_000_000u128),
				base_amount: U256::from(50_000_000_000_000_000u128),
				quote_amount: U256::ZERO,
				auction_duration: 60,
			},
			created_at: now_secs(),
		}
	}

	fn event(id: &str, status: OrderStatus) -> OrderStatusEvent {
		OrderStatusEvent {
			order_id: OrderId::from(id),
			status,
		}
	}

	#[tokio::test]
	async fn test_order_lifecycle_end_to_end() {
		let h = Harness::new();
		let id = OrderId::from("0xABC");
		h.ledger.insert_order(order("0xABC", OrderStatus::UserInitiated));
		h.custody.script_withdrawal(
			"0xABC-solver",
			vec![
				(WithdrawalStatus::Submitted, None),
				(WithdrawalStatus::Broadcasting, None),
				(WithdrawalStatus::Completed, Some("0xdeadbeef".into())),
			],
		);

		let engine = h
			.engine(Arc::new(ReplayDiscovery::new(vec![event(
				"0xABC",
				OrderStatus::UserInitiated,
			)])))
			.await;
		engine.run(std::future::pending()).await.unwrap();

		let reactions = h.ledger.reactions();
		assert_eq!(reactions.len(), 1);
		assert_eq!(reactions[0].price_e18, U256::from(MAX_PRICE));
		assert_eq!(
			reactions[0].deposit_address,
			"0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
		);

		// The auction closes in the solver's favour.
		h.ledger.set_status(&id, OrderStatus::WaitForSolverTx);
		h.ledger.set_solver(&id, Some(solver()));

		let engine = h
			.engine(Arc::new(ReplayDiscovery::new(vec![event(
				"0xABC",
				OrderStatus::WaitForSolverTx,
			)])))
			.await;
		engine.run(std::future::pending()).await.unwrap();

		let requests = h.custody.created_requests();
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].external_id, "0xABC-solver");
		assert_eq!(requests[0].asset_id, "BTC");
		// 0.05 * 0.03 = 0.0015 BTC
		assert_eq!(requests[0].amount, "0.0015");
		assert_eq!(requests[0].to_address, "bc1qrecipient");
		assert_eq!(h.custody.fetch_calls(), 3);

		let settlements = h.ledger.settlements();
		assert_eq!(settlements.len(), 1);
		assert_eq!(settlements[0].order_id, id);
		assert_eq!(settlements[0].blockchain_tx_id, "0xdeadbeef");
		assert_eq!(h.ledger.order(&id).unwrap().status, OrderStatus::Settled);
		assert!(h.alerts.alerts().is_empty());
	}

	#[tokio::test]
	async fn test_duplicate_events_pay_out_once() {
		let h = Harness::new();
		let id = OrderId::from("0xABC");
		let mut won = order("0xABC", OrderStatus::WaitForSolverTx);
		won.solver = Some(solver());
		h.ledger.insert_order(won);
		h.custody.script_withdrawal(
			"0xABC-solver",
			vec![
				(WithdrawalStatus::Submitted, None),
				(WithdrawalStatus::Completed, Some("0xdeadbeef".into())),
			],
		);

		let engine = h
			.engine(Arc::new(ReplayDiscovery::new(vec![
				event("0xABC", OrderStatus::WaitForSolverTx),
				event("0xABC", OrderStatus::WaitForSolverTx),
			])))
			.await;
		engine.run(std::future::pending()).await.unwrap();

		assert_eq!(h.custody.job_count(), 1);
		assert_eq!(h.ledger.settlements().len(), 1);
		assert!(h.alerts.alerts().is_empty());

		// A late redelivery after settlement is a no-op.
		let dispatch = engine
			.processor()
			.handle(&event("0xABC", OrderStatus::WaitForSolverTx))
			.await;
		assert_eq!(
			dispatch,
			Dispatch::Settled(SettleOutcome::Skipped(SkipReason::StatusMismatch(
				OrderStatus::Settled
			)))
		);
		assert_eq!(h.custody.job_count(), 1);
		assert_eq!(h.ledger.order(&id).unwrap().status, OrderStatus::Settled);
	}

	#[tokio::test]
	async fn test_routes_by_status() {
		let h = Harness::new();
		h.ledger.insert_order(order("0x1", OrderStatus::Matched));
		let engine = h.engine(Arc::new(ReplayDiscovery::new(vec![]))).await;
		let processor = engine.processor();

		// Events are hints: the reactor re-reads the order and finds it matched.
		assert_eq!(
			processor
				.handle(&event("0x1", OrderStatus::AuctionInProgress))
				.await,
			Dispatch::Reacted(ReactOutcome::Skipped(SkipReason::StatusMismatch(
				OrderStatus::Matched
			)))
		);
		assert_eq!(
			processor.handle(&event("0x1", OrderStatus::Matched)).await,
			Dispatch::Ignored(OrderStatus::Matched)
		);
		assert_eq!(
			processor.handle(&event("0x1", OrderStatus::Other(7))).await,
			Dispatch::Ignored(OrderStatus::Other(7))
		);
		assert!(h.ledger.reactions().is_empty());
	}

	#[tokio::test]
	async fn test_handler_errors_are_contained() {
		let h = Harness::new();
		h.ledger.insert_order(order("0x2", OrderStatus::UserInitiated));
		let engine = h
			.engine(Arc::new(ReplayDiscovery::new(vec![
				event("0x404", OrderStatus::UserInitiated),
				event("0x404", OrderStatus::WaitForSolverTx),
				event("0x2", OrderStatus::UserInitiated),
			])))
			.await;

		assert!(matches!(
			engine
				.processor()
				.handle(&event("0x404", OrderStatus::WaitForSolverTx))
				.await,
			Dispatch::Failed(_)
		));

		// Unknown orders fail their own handlers; the stream keeps going.
		engine.run(std::future::pending()).await.unwrap();
		assert_eq!(h.ledger.reactions().len(), 1);
	}

	#[tokio::test]
	async fn test_replay_dispatches_current_status() {
		let h = Harness::new();
		let id = OrderId::from("0xABC");
		let mut won = order("0xABC", OrderStatus::WaitForSolverTx);
		won.solver = Some(solver());
		h.ledger.insert_order(won);
		h.custody.script_withdrawal(
			"0xABC-solver",
			vec![(WithdrawalStatus::Completed, Some("0xdeadbeef".into()))],
		);

		let engine = h.engine(Arc::new(ReplayDiscovery::new(vec![]))).await;
		let dispatch = engine.replay(&id).await.unwrap();

		assert!(matches!(
			dispatch,
			Dispatch::Settled(SettleOutcome::Polling {
				recovered: false,
				..
			})
		));
		assert!(!engine.poller().is_polling(&id));
		assert_eq!(h.ledger.settlements()[0].blockchain_tx_id, "0xdeadbeef");

		assert!(engine.replay(&OrderId::from("0x404")).await.is_err());
	}

	#[tokio::test]
	async fn test_shutdown_stops_discovery_and_polls() {
		let h = Harness::new();
		let id = OrderId::from("0xABC");
		let mut won = order("0xABC", OrderStatus::WaitForSolverTx);
		won.solver = Some(solver());
		h.ledger.insert_order(won);
		// The withdrawal never progresses.
		h.custody
			.script_withdrawal("0xABC-solver", vec![(WithdrawalStatus::Submitted, None)]);

		let discovery = Arc::new(HeldDiscovery {
			events: vec![event("0xABC", OrderStatus::WaitForSolverTx)],
			..Default::default()
		});
		let engine = Arc::new(h.engine_with_attempts(discovery.clone(), 100_000).await);

		let (stop_tx, stop_rx) = oneshot::channel::<()>();
		let running = {
			let engine = engine.clone();
			tokio::spawn(async move {
				engine
					.run(async {
						let _ = stop_rx.await;
					})
					.await
			})
		};

		while !engine.poller().is_polling(&id) {
			tokio::time::sleep(Duration::from_millis(1)).await;
		}
		stop_tx.send(()).unwrap();

		tokio::time::timeout(Duration::from_secs(5), running)
			.await
			.unwrap()
			.unwrap()
			.unwrap();

		assert!(discovery.sender.lock().await.is_none());
		assert_eq!(engine.poller().active_count(), 0);
		assert!(h.ledger.settlements().is_empty());
		assert!(h.alerts.alerts().is_empty());
	}
}
