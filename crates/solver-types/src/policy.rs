//! Policy switches for the fulfillment flow.

use serde::{Deserialize, Serialize};

/// When a polled withdrawal counts as confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
	/// Require the job status to be `completed` and a transaction id to be present.
	#[default]
	RequireCompleted,
	/// Accept any job that exposes a transaction id, whatever its status.
	TransactionIdOnly,
}

/// How the solver prices its auction commitment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BidPolicy {
	/// Commit at the order's maximum acceptable price.
	#[default]
	MaxPrice,
	/// Commit below the maximum price by `bps` basis points.
	Discount { bps: u16 },
}
