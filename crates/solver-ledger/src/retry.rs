//! Exponential backoff for ledger writes.
//!
//! Ledger submissions fail transiently under chain congestion or RPC
//! hiccups. [`retry_with_backoff`] re-runs an operation with growing delays
//! until it succeeds or the retry budget is spent.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget and delay bounds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Retries after the first attempt.
	pub max_retries: u32,
	pub initial_interval: Duration,
	pub max_interval: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 5,
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(30),
		}
	}
}

impl RetryPolicy {
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_max_interval(self.max_interval)
			.with_max_elapsed_time(None)
			.build()
	}
}

/// Runs `operation` until it succeeds or `policy.max_retries` retries failed.
///
/// Returns the last error once the budget is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
	label: &str,
	policy: &RetryPolicy,
	mut operation: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: Display,
{
	let mut backoff = policy.backoff();
	let mut attempts = 0u32;

	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(e) => {
				attempts += 1;

				if attempts > policy.max_retries {
					warn!(
						"{} failed after {} attempts, giving up: {}",
						label, attempts, e
					);
					return Err(e);
				}

				let delay = backoff.next_backoff().unwrap_or(policy.max_interval);
				warn!(
					"{} failed, attempt {}/{}, retrying in {:?}: {}",
					label,
					attempts,
					policy.max_retries + 1,
					delay,
					e
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}
