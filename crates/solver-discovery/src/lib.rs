//! Order status event discovery.
//!
//! Discovery sources push `(orderId, status)` notifications into a channel
//! consumed by the solver engine. Delivery is at-least-once; consumers
//! re-read the order before acting on any event.

use async_trait::async_trait;
use solver_types::OrderStatusEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod onchain;
	pub mod replay;
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Already monitoring")]
	AlreadyMonitoring,
}

/// A source of order status events.
#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
	/// Starts pushing events into `sender`.
	///
	/// The source drops `sender` when it has nothing more to deliver, which
	/// closes the channel.
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<OrderStatusEvent>,
	) -> Result<(), DiscoveryError>;

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError>;
}
