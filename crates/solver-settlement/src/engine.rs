//! Settlement engine.

use crate::payout::{derive_quote_amount, format_amount};
use crate::{SettlementError, WithdrawalPoller};
use alloy::primitives::Address;
use solver_custody::{AssetResolver, CustodyError, CustodyInterface};
use solver_ledger::OrderLedgerInterface;
use solver_types::{
	truncate_id, Alert, AlertKind, AlertSink, OrderId, OrderStatus, SkipReason, WithdrawalJob,
	WithdrawalRequest,
};
use std::sync::Arc;
use tracing::{info, warn};

/// What a settlement attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
	Skipped(SkipReason),
	/// A withdrawal exists and is being polled in the background.
	Polling {
		transaction_id: String,
		/// The withdrawal was created by an earlier attempt.
		recovered: bool,
	},
}

pub struct SettlementEngine {
	ledger: Arc<dyn OrderLedgerInterface>,
	custody: Arc<dyn CustodyInterface>,
	resolver: Arc<AssetResolver>,
	poller: Arc<WithdrawalPoller>,
	alerts: Arc<dyn AlertSink>,
	solver_address: Address,
	account_id: String,
}

impl SettlementEngine {
	pub fn new(
		ledger: Arc<dyn OrderLedgerInterface>,
		custody: Arc<dyn CustodyInterface>,
		resolver: Arc<AssetResolver>,
		poller: Arc<WithdrawalPoller>,
		alerts: Arc<dyn AlertSink>,
		solver_address: Address,
		account_id: impl Into<String>,
	) -> Self {
		Self {
			ledger,
			custody,
			resolver,
			poller,
			alerts,
			solver_address,
			account_id: account_id.into(),
		}
	}

	pub fn poller(&self) -> &Arc<WithdrawalPoller> {
		&self.poller
	}

	/// Starts paying out `order_id` if it waits on this solver.
	///
	/// Returns once the withdrawal exists and its poll is running; the
	/// payout is recorded on the ledger later by the poller.
	pub async fn settle(&self, order_id: &OrderId) -> Result<SettleOutcome, SettlementError> {
		let order = self.ledger.get_order(order_id).await?;
		let short_id = truncate_id(order_id.as_str());

		if order.status != OrderStatus::WaitForSolverTx {
			info!(order_id = %short_id, status = %order.status, "Order not awaiting payout, skipping");
			return Ok(SettleOutcome::Skipped(SkipReason::StatusMismatch(
				order.status,
			)));
		}
		if !order.is_assigned_to(&self.solver_address) {
			info!(order_id = %short_id, "Order won by another solver, skipping");
			return Ok(SettleOutcome::Skipped(SkipReason::NotAssignedSolver));
		}

		let base = self
			.resolver
			.resolve(&order.base.token_address, &order.base.network_id)
			.await?;
		let quote = self
			.resolver
			.resolve(&order.quote.token_address, &order.quote.network_id)
			.await?;

		let amount = derive_quote_amount(&order.pricing, base.decimals, quote.decimals)?;
		if amount.is_zero() {
			return Err(SettlementError::ZeroPayout);
		}

		let request = WithdrawalRequest {
			account_id: self.account_id.clone(),
			external_id: order_id.withdrawal_external_id(),
			asset_id: quote.asset_id,
			amount: format_amount(amount, quote.decimals),
			to_address: order.quote.recipient_address.clone(),
		};
		info!(
			order_id = %short_id,
			asset_id = %request.asset_id,
			amount = %request.amount,
			to = %request.to_address,
			"Creating payout withdrawal"
		);

		let (job, recovered) = self.create_or_recover(order_id, &request).await?;
		let transaction_id = job.id.clone();

		match self.poller.spawn(order_id.clone(), job).await {
			Ok(()) => Ok(SettleOutcome::Polling {
				transaction_id,
				recovered,
			}),
			Err(reason) => {
				info!(order_id = %short_id, "Withdrawal already being polled");
				Ok(SettleOutcome::Skipped(reason))
			}
		}
	}

	/// Creates the withdrawal, or finds the one an earlier attempt created.
	async fn create_or_recover(
		&self,
		order_id: &OrderId,
		request: &WithdrawalRequest,
	) -> Result<(WithdrawalJob, bool), SettlementError> {
		let error = match self.custody.create_transaction(request).await {
			Ok(job) => {
				info!(
					order_id = %truncate_id(order_id.as_str()),
					transaction_id = %job.id,
					"Withdrawal created"
				);
				return Ok((job, false));
			}
			Err(CustodyError::AlreadyExists(_)) => {
				warn!(
					external_id = %request.external_id,
					"Withdrawal already exists, recovering it"
				);
				match self
					.custody
					.get_transactions(&request.account_id, &request.external_id)
					.await
				{
					Ok(jobs) => match jobs.into_iter().next() {
						Some(job) => return Ok((job, true)),
						None => SettlementError::WithdrawalNotFound(request.external_id.clone()),
					},
					Err(e) => SettlementError::Custody(e),
				}
			}
			Err(e) => SettlementError::Custody(e),
		};

		self.alerts.raise(Alert::new(
			AlertKind::WithdrawalCreationFailed,
			order_id,
			format!(
				"could not create withdrawal {}: {}",
				request.external_id, error
			),
		));
		Err(error)
	}
}
