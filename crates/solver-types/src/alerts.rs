//! Operator alerts.
//!
//! Alerts mark states where funds or on-chain bookkeeping may be
//! inconsistent and a human has to look. They travel through [`AlertSink`]
//! so they stay distinguishable from routine log lines.

use crate::{truncate_id, OrderId};
use std::fmt;
use std::sync::Mutex;

/// Log target used for alert events.
pub const ALERT_TARGET: &str = "solver::alert";

/// Conditions that require operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
	/// Creating the payout withdrawal failed for a reason other than an
	/// idempotency collision.
	WithdrawalCreationFailed,
	/// The withdrawal reached a terminal state without a chain transaction.
	WithdrawalTerminated,
	/// The poller gave up before the withdrawal reached a terminal state.
	WithdrawalPollingExhausted,
	/// Funds moved but recording the transaction on the ledger kept failing.
	SettlementRecordingFailed,
}

impl fmt::Display for AlertKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			AlertKind::WithdrawalCreationFailed => "withdrawal_creation_failed",
			AlertKind::WithdrawalTerminated => "withdrawal_terminated",
			AlertKind::WithdrawalPollingExhausted => "withdrawal_polling_exhausted",
			AlertKind::SettlementRecordingFailed => "settlement_recording_failed",
		};
		f.write_str(name)
	}
}

/// A critical, operator-visible alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
	pub kind: AlertKind,
	pub order_id: OrderId,
	pub message: String,
}

impl Alert {
	pub fn new(kind: AlertKind, order_id: &OrderId, message: impl Into<String>) -> Self {
		Self {
			kind,
			order_id: order_id.clone(),
			message: message.into(),
		}
	}
}

/// Destination for operator alerts.
pub trait AlertSink: Send + Sync {
	fn raise(&self, alert: Alert);
}

/// Emits alerts as `error` events on the [`ALERT_TARGET`] log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
	fn raise(&self, alert: Alert) {
		tracing::error!(
			target: ALERT_TARGET,
			alert = %alert.kind,
			severity = "critical",
			order_id = %truncate_id(alert.order_id.as_str()),
			"{}",
			alert.message
		);
	}
}

/// Keeps every raised alert in memory.
///
/// Used by tests to assert which alerts fired and how often.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
	alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn alerts(&self) -> Vec<Alert> {
		self.alerts
			.lock()
			.map(|alerts| alerts.clone())
			.unwrap_or_default()
	}

	pub fn count(&self, kind: AlertKind) -> usize {
		self.alerts().iter().filter(|a| a.kind == kind).count()
	}
}

impl AlertSink for RecordingAlertSink {
	fn raise(&self, alert: Alert) {
		if let Ok(mut alerts) = self.alerts.lock() {
			alerts.push(alert);
		}
	}
}
