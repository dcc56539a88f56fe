//! Replays a fixed list of status events.
//!
//! Used by the operator `replay` command and by tests. Every event is sent
//! once, then the sender is dropped so the consumer sees the stream end.

use crate::{DiscoveryError, DiscoveryInterface};
use async_trait::async_trait;
use solver_types::OrderStatusEvent;
use tokio::sync::{mpsc, Mutex};

pub struct ReplayDiscovery {
	events: Mutex<Option<Vec<OrderStatusEvent>>>,
}

impl ReplayDiscovery {
	pub fn new(events: Vec<OrderStatusEvent>) -> Self {
		Self {
			events: Mutex::new(Some(events)),
		}
	}
}

#[async_trait]
impl DiscoveryInterface for ReplayDiscovery {
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<OrderStatusEvent>,
	) -> Result<(), DiscoveryError> {
		let events = self
			.events
			.lock()
			.await
			.take()
			.ok_or(DiscoveryError::AlreadyMonitoring)?;

		tracing::debug!("Replaying {} events", events.len());
		for event in events {
			if sender.send(event).is_err() {
				break;
			}
		}
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		Ok(())
	}
}
