//! Withdrawal poller.
//!
//! Watches a payout withdrawal until it produces a destination-chain
//! transaction or stops without one, then records the transaction on the
//! order ledger. Each withdrawal is polled by its own background task so the
//! event path never waits on the payment provider.

use dashmap::DashSet;
use solver_custody::CustodyInterface;
use solver_ledger::retry::{retry_with_backoff, RetryPolicy};
use solver_ledger::OrderLedgerInterface;
use solver_types::{
	truncate_id, Alert, AlertKind, AlertSink, ConfirmationPolicy, OrderId, OrderStatus,
	SkipReason, WithdrawalJob, WithdrawalStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
	/// Delay between two fetches of the job.
	pub interval: Duration,
	/// Fetches before giving up.
	pub max_attempts: u32,
	pub confirmation: ConfirmationPolicy,
	/// Retry budget for recording the payout on the ledger.
	pub record_retry: RetryPolicy,
}

impl Default for PollerConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(2),
			max_attempts: 60,
			confirmation: ConfirmationPolicy::default(),
			record_retry: RetryPolicy::default(),
		}
	}
}

/// How a poll run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
	/// The transaction id is recorded on the ledger.
	Confirmed(String),
	/// Funds moved but recording kept failing.
	RecordingFailed(String),
	/// The job stopped without a usable transaction id.
	Terminated(WithdrawalStatus),
	/// The attempt budget ran out.
	Exhausted,
	/// Shutdown interrupted polling.
	Cancelled,
}

enum JobState {
	Pending,
	Confirmed(String),
	Terminated(WithdrawalStatus),
}

fn evaluate(job: &WithdrawalJob, policy: ConfirmationPolicy) -> JobState {
	match (policy, job.chain_tx_id()) {
		(ConfirmationPolicy::TransactionIdOnly, Some(tx_id)) => {
			JobState::Confirmed(tx_id.to_string())
		}
		(ConfirmationPolicy::RequireCompleted, Some(tx_id))
			if job.status == WithdrawalStatus::Completed =>
		{
			JobState::Confirmed(tx_id.to_string())
		}
		_ if job.status.is_terminal() => JobState::Terminated(job.status.clone()),
		_ => JobState::Pending,
	}
}

/// Resolves once shutdown is requested or the poller is gone.
async fn stop_requested(cancel: &mut watch::Receiver<bool>) {
	loop {
		if *cancel.borrow_and_update() {
			return;
		}
		if cancel.changed().await.is_err() {
			return;
		}
	}
}

/// Releases an order's in-flight slot when its task ends, even if aborted.
struct ActiveGuard {
	active: Arc<DashSet<OrderId>>,
	order_id: OrderId,
}

impl Drop for ActiveGuard {
	fn drop(&mut self) {
		self.active.remove(&self.order_id);
	}
}

/// Raises [`AlertKind::SettlementRecordingFailed`] if a confirmed payout's
/// recording is dropped before it resolves, e.g. aborted on shutdown.
struct RecordingGuard {
	alerts: Arc<dyn AlertSink>,
	order_id: OrderId,
	tx_id: String,
	resolved: bool,
}

impl Drop for RecordingGuard {
	fn drop(&mut self) {
		if self.resolved {
			return;
		}
		self.alerts.raise(Alert::new(
			AlertKind::SettlementRecordingFailed,
			&self.order_id,
			format!(
				"payout {} moved but recording was interrupted by shutdown",
				self.tx_id
			),
		));
	}
}

fn log_join_error(result: Result<(), JoinError>) {
	if let Err(e) = result {
		if e.is_panic() {
			error!("Withdrawal poll task panicked: {}", e);
		}
	}
}

struct PollerInner {
	custody: Arc<dyn CustodyInterface>,
	ledger: Arc<dyn OrderLedgerInterface>,
	alerts: Arc<dyn AlertSink>,
	config: PollerConfig,
}

impl PollerInner {
	async fn run(
		&self,
		order_id: &OrderId,
		job: &WithdrawalJob,
		mut cancel: watch::Receiver<bool>,
	) -> PollOutcome {
		let short_id = truncate_id(order_id.as_str());

		for attempt in 1..=self.config.max_attempts {
			let fetched = tokio::select! {
				biased;
				_ = stop_requested(&mut cancel) => return self.interrupted(&short_id),
				fetched = self.custody.get_transaction(&job.id) => fetched,
			};

			match fetched {
				Ok(current) => match evaluate(&current, self.config.confirmation) {
					JobState::Confirmed(tx_id) => return self.record(order_id, tx_id).await,
					JobState::Terminated(status) => {
						self.alerts.raise(Alert::new(
							AlertKind::WithdrawalTerminated,
							order_id,
							format!(
								"withdrawal {} ended as {:?} without a chain transaction",
								job.id, status
							),
						));
						return PollOutcome::Terminated(status);
					}
					JobState::Pending => debug!(
						order_id = %short_id,
						transaction_id = %job.id,
						status = ?current.status,
						attempt,
						"Withdrawal still in flight"
					),
				},
				Err(e) => warn!(
					order_id = %short_id,
					transaction_id = %job.id,
					attempt,
					"Failed to fetch withdrawal: {}",
					e
				),
			}

			if attempt < self.config.max_attempts {
				tokio::select! {
					biased;
					_ = stop_requested(&mut cancel) => return self.interrupted(&short_id),
					_ = tokio::time::sleep(self.config.interval) => {}
				}
			}
		}

		self.alerts.raise(Alert::new(
			AlertKind::WithdrawalPollingExhausted,
			order_id,
			format!(
				"withdrawal {} unresolved after {} polls",
				job.id, self.config.max_attempts
			),
		));
		PollOutcome::Exhausted
	}

	fn interrupted(&self, short_id: &str) -> PollOutcome {
		info!(order_id = %short_id, "Withdrawal polling interrupted by shutdown");
		PollOutcome::Cancelled
	}

	/// Records the payout transaction. Ignores the cancel signal: funds have
	/// moved. If the task is aborted anyway, the guard raises the alert.
	async fn record(&self, order_id: &OrderId, tx_id: String) -> PollOutcome {
		let short_id = truncate_id(order_id.as_str());
		let mut guard = RecordingGuard {
			alerts: self.alerts.clone(),
			order_id: order_id.clone(),
			tx_id: tx_id.clone(),
			resolved: false,
		};

		// A previous run may already have recorded it.
		if let Ok(order) = self.ledger.get_order(order_id).await {
			if order.status == OrderStatus::Settled {
				guard.resolved = true;
				info!(order_id = %short_id, "Order already settled, nothing to record");
				return PollOutcome::Confirmed(tx_id);
			}
		}

		info!(order_id = %short_id, tx_id = %tx_id, "Withdrawal confirmed, recording on ledger");
		let ledger = self.ledger.as_ref();
		let tx = tx_id.as_str();
		let result = retry_with_backoff(
			"setSolverTxOnQuoteNetwork",
			&self.config.record_retry,
			move || ledger.set_solver_tx_on_quote_network(order_id, tx),
		)
		.await;
		guard.resolved = true;

		match result {
			Ok(receipt) => {
				info!(
					order_id = %short_id,
					tx_hash = %truncate_id(&receipt.hash.to_string()),
					block = receipt.block_number,
					"Settlement recorded"
				);
				PollOutcome::Confirmed(tx_id)
			}
			Err(e) => {
				self.alerts.raise(Alert::new(
					AlertKind::SettlementRecordingFailed,
					order_id,
					format!("payout {} moved but recording failed: {}", tx_id, e),
				));
				PollOutcome::RecordingFailed(tx_id)
			}
		}
	}
}

/// Runs one background poll per withdrawal and tracks them for shutdown.
pub struct WithdrawalPoller {
	inner: Arc<PollerInner>,
	active: Arc<DashSet<OrderId>>,
	tasks: Mutex<JoinSet<()>>,
	cancel: watch::Sender<bool>,
}

impl WithdrawalPoller {
	pub fn new(
		custody: Arc<dyn CustodyInterface>,
		ledger: Arc<dyn OrderLedgerInterface>,
		alerts: Arc<dyn AlertSink>,
		config: PollerConfig,
	) -> Self {
		let (cancel, _) = watch::channel(false);
		Self {
			inner: Arc::new(PollerInner {
				custody,
				ledger,
				alerts,
				config,
			}),
			active: Arc::new(DashSet::new()),
			tasks: Mutex::new(JoinSet::new()),
			cancel,
		}
	}

	/// Polls `job` to completion on the current task.
	pub async fn await_completion(&self, order_id: &OrderId, job: &WithdrawalJob) -> PollOutcome {
		self.inner
			.run(order_id, job, self.cancel.subscribe())
			.await
	}

	/// Starts polling `job` in the background.
	///
	/// Skips with [`SkipReason::AlreadyPolling`] if the order already has a
	/// running poll.
	pub async fn spawn(&self, order_id: OrderId, job: WithdrawalJob) -> Result<(), SkipReason> {
		if !self.active.insert(order_id.clone()) {
			return Err(SkipReason::AlreadyPolling);
		}
		let guard = ActiveGuard {
			active: self.active.clone(),
			order_id: order_id.clone(),
		};

		let inner = self.inner.clone();
		let cancel = self.cancel.subscribe();
		let mut tasks = self.tasks.lock().await;
		while let Some(finished) = tasks.try_join_next() {
			log_join_error(finished);
		}

		tasks.spawn(async move {
			let _guard = guard;
			let outcome = inner.run(&order_id, &job, cancel).await;
			debug!(
				order_id = %truncate_id(order_id.as_str()),
				outcome = ?outcome,
				"Withdrawal poll finished"
			);
		});
		Ok(())
	}

	pub fn is_polling(&self, order_id: &OrderId) -> bool {
		self.active.contains(order_id)
	}

	pub fn active_count(&self) -> usize {
		self.active.len()
	}

	/// Waits until every background poll has finished.
	pub async fn wait_idle(&self) {
		let mut tasks = self.tasks.lock().await;
		while let Some(result) = tasks.join_next().await {
			log_join_error(result);
		}
	}

	/// Interrupts background polls and waits up to `grace` for them to stop.
	///
	/// Polls that are recording a confirmed payout keep recording until
	/// `grace` runs out. Anything still running then is aborted and awaited,
	/// and every aborted recording raises a
	/// [`AlertKind::SettlementRecordingFailed`] alert.
	pub async fn shutdown(&self, grace: Duration) {
		self.cancel.send_replace(true);
		let running = self.active.len();
		if running > 0 {
			info!("Stopping {} withdrawal polls", running);
		}

		if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
			warn!("Withdrawal polls still running after {:?}, aborting", grace);
			let mut tasks = self.tasks.lock().await;
			tasks.abort_all();
			while let Some(result) = tasks.join_next().await {
				log_join_error(result);
			}
		}
	}
}
