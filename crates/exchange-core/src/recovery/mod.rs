//! Recovery module for re-arming expirations after a restart.
//!
//! In-process timers are lost when the process exits. On startup every
//! stored order sitting in a timed state gets its expiration callback
//! scheduled again; callbacks that are already past due fire right away.

use crate::expiration::{ExpirationRequest, ExpirationScheduler};
use crate::state::OrderStateMachine;
use exchange_types::truncate_id;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during recovery operations.
#[derive(Debug, Error)]
pub enum RecoveryError {
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Report of the recovery operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Total number of orders found in storage.
	pub total_orders: usize,
	/// Orders in a terminal state, left alone.
	pub terminal_orders: usize,
	/// Orders whose expiration was scheduled again.
	pub rescheduled: usize,
	/// Orders whose expiration could not be scheduled.
	pub failed: usize,
}

/// Service responsible for restoring expiration callbacks from storage.
pub struct RecoveryService {
	state_machine: Arc<OrderStateMachine>,
	scheduler: Arc<dyn ExpirationScheduler>,
}

impl RecoveryService {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		scheduler: Arc<dyn ExpirationScheduler>,
	) -> Self {
		Self {
			state_machine,
			scheduler,
		}
	}

	/// Schedules an expiration for every stored order that has one pending.
	#[instrument(skip_all)]
	pub async fn recover_state(&self) -> Result<RecoveryReport, RecoveryError> {
		tracing::info!("Starting state recovery from storage");

		let orders = self
			.state_machine
			.all_orders()
			.await
			.map_err(|e| RecoveryError::Storage(e.to_string()))?;

		let mut report = RecoveryReport {
			total_orders: orders.len(),
			..Default::default()
		};

		for order in orders {
			if order.state.is_terminal() {
				report.terminal_orders += 1;
				continue;
			}
			let Some(run_at) = order.state_expires_at else {
				continue;
			};

			let request = ExpirationRequest {
				order_id: order.id.clone(),
				expected_state: order.state,
				run_at,
			};
			match self.scheduler.schedule(request).await {
				Ok(()) => report.rescheduled += 1,
				Err(e) => {
					tracing::warn!(
						order_id = %truncate_id(&order.id),
						error = %e,
						"Failed to reschedule expiration"
					);
					report.failed += 1;
				},
			}
		}

		tracing::info!(
			"Recovery complete: {} orders found, {} rescheduled, {} terminal",
			report.total_orders,
			report.rescheduled,
			report.terminal_orders
		);
		Ok(report)
	}
}
