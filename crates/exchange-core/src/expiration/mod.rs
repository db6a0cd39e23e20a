//! Delayed expiration callbacks.
//!
//! Whenever an order enters a state with a timeout, an [`ExpirationRequest`]
//! is scheduled for the moment the state expires. Callbacks are never
//! cancelled; when one fires, [`job::ExpireOrderJob`] re-checks the order and
//! does nothing if the order has moved on.

pub mod job;

use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_types::{truncate_id, OrderState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use job::{ExpireOrderJob, OrderLifecycle};

/// Errors that can occur while scheduling or running expirations.
#[derive(Debug, Error)]
pub enum ExpirationError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Expiration runner is not accepting callbacks")]
	SchedulerClosed,
}

/// A one-shot callback asking to expire `order_id` if it is still in
/// `expected_state` at `run_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationRequest {
	pub order_id: String,
	pub expected_state: OrderState,
	pub run_at: DateTime<Utc>,
}

/// Delivers expiration callbacks at or after their target time.
///
/// Delivery is at-least-once; duplicate or late callbacks are harmless.
#[async_trait]
pub trait ExpirationScheduler: Send + Sync {
	async fn schedule(&self, request: ExpirationRequest) -> Result<(), ExpirationError>;
}

/// In-process scheduler backed by tokio timers.
///
/// Each request sleeps on its own task and is then handed to the engine over
/// an mpsc channel. Timers do not survive a restart; recovery re-arms them
/// from storage.
pub struct TimerScheduler {
	sender: mpsc::UnboundedSender<ExpirationRequest>,
	clock: Arc<dyn Clock>,
	grace: Duration,
}

impl TimerScheduler {
	/// Creates a scheduler and the receiving end due requests arrive on.
	pub fn new(
		clock: Arc<dyn Clock>,
		grace: Duration,
	) -> (Self, mpsc::UnboundedReceiver<ExpirationRequest>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(
			Self {
				sender,
				clock,
				grace,
			},
			receiver,
		)
	}

	/// Time to wait before `run_at` is reached, plus the grace period.
	fn delay_until(&self, run_at: DateTime<Utc>) -> Duration {
		let remaining = (run_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
		remaining + self.grace
	}
}

#[async_trait]
impl ExpirationScheduler for TimerScheduler {
	async fn schedule(&self, request: ExpirationRequest) -> Result<(), ExpirationError> {
		if self.sender.is_closed() {
			return Err(ExpirationError::SchedulerClosed);
		}

		let delay = self.delay_until(request.run_at);
		tracing::debug!(
			order_id = %truncate_id(&request.order_id),
			state = %request.expected_state,
			delay_secs = delay.as_secs(),
			"Scheduled expiration"
		);

		let sender = self.sender.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			if let Err(e) = sender.send(request) {
				tracing::debug!(
					order_id = %truncate_id(&e.0.order_id),
					"Expiration runner stopped, dropping callback"
				);
			}
		});
		Ok(())
	}
}
