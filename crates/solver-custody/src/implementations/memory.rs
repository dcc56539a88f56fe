//! In-memory payment API.
//!
//! Enforces external-id uniqueness like the real service and lets tests
//! script how each withdrawal progresses from one poll to the next.

use crate::{CustodyError, CustodyInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use solver_types::{Asset, WithdrawalJob, WithdrawalRequest, WithdrawalStatus};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// One scripted poll result: the job status and its chain transaction id.
pub type ScriptStep = (WithdrawalStatus, Option<String>);

#[derive(Default)]
pub struct InMemoryCustody {
	assets: DashMap<String, Asset>,
	native_assets: DashMap<String, String>,
	deposit_addresses: DashMap<(String, String), String>,
	jobs: DashMap<String, WithdrawalJob>,
	/// Job id by (account, external id).
	external_ids: DashMap<(String, String), String>,
	/// Scripts registered by external id before the job exists.
	pending_scripts: DashMap<String, VecDeque<ScriptStep>>,
	scripts: DashMap<String, VecDeque<ScriptStep>>,
	requests: Mutex<Vec<WithdrawalRequest>>,
	failing_fetches: AtomicU32,
	fail_creation: AtomicBool,
	create_calls: AtomicU32,
	fetch_calls: AtomicU32,
	asset_lookups: AtomicU32,
}

impl InMemoryCustody {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_asset(&self, asset: Asset) {
		self.assets.insert(asset.id.clone(), asset);
	}

	/// Registers `asset` as the native currency of its network.
	pub fn add_native_asset(&self, asset: Asset) {
		self.native_assets
			.insert(asset.network_id.clone(), asset.id.clone());
		self.add_asset(asset);
	}

	pub fn set_deposit_address(&self, account_id: &str, network_id: &str, address: &str) {
		self.deposit_addresses.insert(
			(account_id.to_string(), network_id.to_string()),
			address.to_string(),
		);
	}

	/// Scripts the states returned by successive `get_transaction` calls for
	/// the job created under `external_id`. The last state sticks.
	pub fn script_withdrawal(&self, external_id: &str, steps: Vec<ScriptStep>) {
		let steps: VecDeque<_> = steps.into();
		match self.find_job_id(external_id) {
			Some(job_id) => {
				self.scripts.insert(job_id, steps);
			}
			None => {
				self.pending_scripts.insert(external_id.to_string(), steps);
			}
		}
	}

	/// Makes the next `n` job fetches fail with a network error.
	pub fn fail_next_fetches(&self, n: u32) {
		self.failing_fetches.store(n, Ordering::SeqCst);
	}

	/// Makes withdrawal creation fail with a server error while set.
	pub fn fail_creation(&self, fail: bool) {
		self.fail_creation.store(fail, Ordering::SeqCst);
	}

	/// Number of `create_transaction` calls, successful or not.
	pub fn create_calls(&self) -> u32 {
		self.create_calls.load(Ordering::SeqCst)
	}

	/// Number of `get_transaction` calls, successful or not.
	pub fn fetch_calls(&self) -> u32 {
		self.fetch_calls.load(Ordering::SeqCst)
	}

	/// Number of asset lookups served, native or by contract.
	pub fn asset_lookups(&self) -> u32 {
		self.asset_lookups.load(Ordering::SeqCst)
	}

	/// Withdrawal requests that created a job.
	pub fn created_requests(&self) -> Vec<WithdrawalRequest> {
		self.requests
			.lock()
			.map(|r| r.clone())
			.unwrap_or_default()
	}

	pub fn job_count(&self) -> usize {
		self.jobs.len()
	}

	fn find_job_id(&self, external_id: &str) -> Option<String> {
		self.external_ids
			.iter()
			.find(|entry| entry.key().1 == external_id)
			.map(|entry| entry.value().clone())
	}
}

#[async_trait]
impl CustodyInterface for InMemoryCustody {
	async fn native_asset_id(&self, network_id: &str) -> Result<String, CustodyError> {
		self.asset_lookups.fetch_add(1, Ordering::SeqCst);
		self.native_assets
			.get(network_id)
			.map(|id| id.clone())
			.ok_or_else(|| CustodyError::NotFound(format!("native asset of {}", network_id)))
	}

	async fn asset(&self, asset_id: &str) -> Result<Asset, CustodyError> {
		self.assets
			.get(asset_id)
			.map(|asset| asset.clone())
			.ok_or_else(|| CustodyError::NotFound(format!("asset {}", asset_id)))
	}

	async fn find_assets(
		&self,
		network_id: &str,
		contract_address: &str,
	) -> Result<Vec<Asset>, CustodyError> {
		self.asset_lookups.fetch_add(1, Ordering::SeqCst);
		Ok(self
			.assets
			.iter()
			.filter(|entry| {
				entry.network_id == network_id
					&& entry
						.contract_address
						.as_deref()
						.is_some_and(|addr| addr.eq_ignore_ascii_case(contract_address))
			})
			.map(|entry| entry.value().clone())
			.collect())
	}

	async fn create_transaction(
		&self,
		request: &WithdrawalRequest,
	) -> Result<WithdrawalJob, CustodyError> {
		let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;

		if self.fail_creation.load(Ordering::SeqCst) {
			return Err(CustodyError::Http {
				status: 500,
				body: "internal error".to_string(),
			});
		}

		let key = (request.account_id.clone(), request.external_id.clone());
		// Entry API keeps check-and-insert atomic under concurrent creates.
		let job_id = match self.external_ids.entry(key) {
			dashmap::mapref::entry::Entry::Occupied(_) => {
				return Err(CustodyError::AlreadyExists(request.external_id.clone()));
			}
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				let job_id = format!("tx-{}", n);
				slot.insert(job_id.clone());
				job_id
			}
		};

		let job = WithdrawalJob {
			id: job_id.clone(),
			external_id: Some(request.external_id.clone()),
			status: WithdrawalStatus::Submitted,
			blockchain_tx_id: None,
		};
		self.jobs.insert(job_id.clone(), job.clone());

		if let Some((_, steps)) = self.pending_scripts.remove(&request.external_id) {
			self.scripts.insert(job_id, steps);
		}
		if let Ok(mut requests) = self.requests.lock() {
			requests.push(request.clone());
		}

		Ok(job)
	}

	async fn get_transactions(
		&self,
		account_id: &str,
		external_id: &str,
	) -> Result<Vec<WithdrawalJob>, CustodyError> {
		let key = (account_id.to_string(), external_id.to_string());
		Ok(self
			.external_ids
			.get(&key)
			.and_then(|job_id| self.jobs.get(job_id.value()).map(|job| job.clone()))
			.into_iter()
			.collect())
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<WithdrawalJob, CustodyError> {
		self.fetch_calls.fetch_add(1, Ordering::SeqCst);

		let failing = self
			.failing_fetches
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failing {
			return Err(CustodyError::Network("connection timed out".to_string()));
		}

		let mut job = self
			.jobs
			.get_mut(transaction_id)
			.ok_or_else(|| CustodyError::NotFound(format!("transaction {}", transaction_id)))?;

		if let Some(mut steps) = self.scripts.get_mut(transaction_id) {
			let step = if steps.len() > 1 {
				steps.pop_front()
			} else {
				steps.front().cloned()
			};
			if let Some((status, tx_id)) = step {
				job.status = status;
				job.blockchain_tx_id = tx_id;
			}
		}

		Ok(job.clone())
	}

	async fn deposit_address(
		&self,
		account_id: &str,
		network_id: &str,
	) -> Result<Option<String>, CustodyError> {
		Ok(self
			.deposit_addresses
			.get(&(account_id.to_string(), network_id.to_string()))
			.map(|address| address.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(external_id: &str) -> WithdrawalRequest {
		WithdrawalRequest {
			account_id: "acct-1".into(),
			external_id: external_id.into(),
			asset_id: "USDC".into(),
			amount: "2".into(),
			to_address: "0xrecipient".into(),
		}
	}

	#[tokio::test]
	async fn test_duplicate_external_id_is_rejected() {
		let custody = InMemoryCustody::new();
		let first = custody.create_transaction(&request("0x1-solver")).await.unwrap();
		let second = custody.create_transaction(&request("0x1-solver")).await;

		assert!(matches!(second, Err(CustodyError::AlreadyExists(_))));
		assert_eq!(custody.job_count(), 1);

		let found = custody
			.get_transactions("acct-1", "0x1-solver")
			.await
			.unwrap();
		assert_eq!(found, vec![first]);
	}

	#[tokio::test]
	async fn test_scripted_progress_sticks_on_last_step() {
		let custody = InMemoryCustody::new();
		custody.script_withdrawal(
			"0x1-solver",
			vec![
				(WithdrawalStatus::Broadcasting, None),
				(WithdrawalStatus::Completed, Some("0xdead".into())),
			],
		);
		let job = custody.create_transaction(&request("0x1-solver")).await.unwrap();

		let polled = custody.get_transaction(&job.id).await.unwrap();
		assert_eq!(polled.status, WithdrawalStatus::Broadcasting);
		for _ in 0..2 {
			let polled = custody.get_transaction(&job.id).await.unwrap();
			assert_eq!(polled.status, WithdrawalStatus::Completed);
			assert_eq!(polled.chain_tx_id(), Some("0xdead"));
		}
	}

	#[tokio::test]
	async fn test_injected_fetch_failures() {
		let custody = InMemoryCustody::new();
		let job = custody.create_transaction(&request("0x1-solver")).await.unwrap();
		custody.fail_next_fetches(1);

		assert!(custody.get_transaction(&job.id).await.is_err());
		assert!(custody.get_transaction(&job.id).await.is_ok());
		assert_eq!(custody.fetch_calls(), 2);
	}
}
