//! The job run when an expiration callback fires.

use super::ExpirationError;
use crate::clock::Clock;
use crate::service::{OrderService, OrderServiceError};
use async_trait::async_trait;
use exchange_types::{truncate_id, Order, OrderState};
use std::sync::Arc;
use tracing::instrument;

#[cfg(test)]
use mockall::automock;

/// Lifecycle operations the expiration job depends on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderLifecycle: Send + Sync {
	async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError>;

	/// Abandons the order if it is still in `expected_state` and past its
	/// expiry when the write happens.
	async fn abandon(
		&self,
		order_id: &str,
		expected_state: OrderState,
	) -> Result<Order, OrderServiceError>;

	/// Rejects the order if it is still in `expected_state` and past its
	/// expiry when the write happens.
	async fn reject(
		&self,
		order_id: &str,
		expected_state: OrderState,
	) -> Result<Order, OrderServiceError>;
}

#[async_trait]
impl OrderLifecycle for OrderService {
	async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		OrderService::get_order(self, order_id).await
	}

	async fn abandon(
		&self,
		order_id: &str,
		expected_state: OrderState,
	) -> Result<Order, OrderServiceError> {
		self.expire(order_id, expected_state, OrderState::Abandoned)
			.await
	}

	async fn reject(
		&self,
		order_id: &str,
		expected_state: OrderState,
	) -> Result<Order, OrderServiceError> {
		self.expire(order_id, expected_state, OrderState::Rejected)
			.await
	}
}

impl From<OrderServiceError> for ExpirationError {
	fn from(err: OrderServiceError) -> Self {
		match err {
			OrderServiceError::OrderNotFound(id) => ExpirationError::OrderNotFound(id),
			other => ExpirationError::Storage(other.to_string()),
		}
	}
}

/// Forces a timed-out order into its timeout state.
///
/// Safe to run any number of times for the same callback: anything other
/// than an expired order still in the expected state is left alone.
pub struct ExpireOrderJob {
	lifecycle: Arc<dyn OrderLifecycle>,
	clock: Arc<dyn Clock>,
}

impl ExpireOrderJob {
	pub fn new(lifecycle: Arc<dyn OrderLifecycle>, clock: Arc<dyn Clock>) -> Self {
		Self { lifecycle, clock }
	}

	/// Runs the callback for `order_id` scheduled when it entered
	/// `expected_state`.
	///
	/// Returns `Ok(())` whether or not anything changed. Errors are reserved
	/// for a missing order or a failing store.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), expected = %expected_state))]
	pub async fn perform(
		&self,
		order_id: &str,
		expected_state: OrderState,
	) -> Result<(), ExpirationError> {
		let order = self.lifecycle.get_order(order_id).await?;

		if order.state != expected_state {
			tracing::debug!(state = %order.state, "Order moved on, nothing to expire");
			return Ok(());
		}
		if !order.is_expired_at(self.clock.now()) {
			tracing::debug!(expires_at = ?order.state_expires_at, "Order not expired yet");
			return Ok(());
		}

		let result = match order.state {
			OrderState::Pending => self.lifecycle.abandon(order_id, expected_state).await,
			OrderState::Submitted | OrderState::Approved => {
				self.lifecycle.reject(order_id, expected_state).await
			},
			other => {
				tracing::warn!(state = %other, "No timeout transition for state");
				return Ok(());
			},
		};

		match result {
			Ok(order) => {
				tracing::info!(state = %order.state, "Order expired");
				Ok(())
			},
			// Someone else changed the order between our read and our write
			Err(OrderServiceError::Transition(e)) => {
				tracing::debug!(code = %e.code, "Order changed before it could expire");
				Ok(())
			},
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use crate::test_utils::{harness, submitted_order};
	use chrono::{Duration, Utc};
	use exchange_types::{Party, PartyType, TransitionError};

	fn order_in(state: OrderState, expires_in: Option<Duration>, clock: &ManualClock) -> Order {
		let mut order = Order::new(
			Party::new("gallery-1", PartyType::Gallery),
			Party::new("user-1", PartyType::User),
			clock.now(),
		);
		order.id = "order-1".into();
		order.state = state;
		order.state_expires_at = expires_in.map(|d| clock.now() + d);
		order
	}

	fn job(mock: MockOrderLifecycle, clock: Arc<ManualClock>) -> ExpireOrderJob {
		ExpireOrderJob::new(Arc::new(mock), clock)
	}

	fn returning_order(mock: &mut MockOrderLifecycle, order: Order) {
		mock.expect_get_order()
			.withf(|id| id == "order-1")
			.times(1)
			.returning(move |_| Ok(order.clone()));
	}

	#[tokio::test]
	async fn test_expired_pending_order_is_abandoned() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let order = order_in(OrderState::Pending, Some(Duration::hours(-1)), &clock);

		let mut mock = MockOrderLifecycle::new();
		returning_order(&mut mock, order.clone());
		mock.expect_abandon()
			.withf(|id, state| id == "order-1" && *state == OrderState::Pending)
			.times(1)
			.returning(move |_, _| {
				let mut abandoned = order.clone();
				abandoned.state = OrderState::Abandoned;
				Ok(abandoned)
			});
		mock.expect_reject().never();

		job(mock, clock)
			.perform("order-1", OrderState::Pending)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_expired_submitted_and_approved_orders_are_rejected() {
		for state in [OrderState::Submitted, OrderState::Approved] {
			let clock = Arc::new(ManualClock::new(Utc::now()));
			let order = order_in(state, Some(Duration::zero()), &clock);

			let mut mock = MockOrderLifecycle::new();
			returning_order(&mut mock, order.clone());
			mock.expect_reject()
				.withf(move |id, expected| id == "order-1" && *expected == state)
				.times(1)
				.returning(move |_, _| Ok(order.clone()));
			mock.expect_abandon().never();

			job(mock, clock).perform("order-1", state).await.unwrap();
		}
	}

	#[tokio::test]
	async fn test_wrong_state_is_a_no_op() {
		// (current, expected)
		for (current, expected) in [
			(OrderState::Submitted, OrderState::Pending),
			(OrderState::Approved, OrderState::Submitted),
			(OrderState::Approved, OrderState::Pending),
		] {
			let clock = Arc::new(ManualClock::new(Utc::now()));
			let order = order_in(current, Some(Duration::hours(-1)), &clock);

			let mut mock = MockOrderLifecycle::new();
			returning_order(&mut mock, order);
			mock.expect_abandon().never();
			mock.expect_reject().never();

			job(mock, clock).perform("order-1", expected).await.unwrap();
		}
	}

	#[tokio::test]
	async fn test_too_early_or_without_expiry_is_a_no_op() {
		for expires_in in [Some(Duration::seconds(1)), None] {
			let clock = Arc::new(ManualClock::new(Utc::now()));
			let order = order_in(OrderState::Submitted, expires_in, &clock);

			let mut mock = MockOrderLifecycle::new();
			returning_order(&mut mock, order);
			mock.expect_abandon().never();
			mock.expect_reject().never();

			job(mock, clock)
				.perform("order-1", OrderState::Submitted)
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn test_terminal_state_is_a_no_op() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let order = order_in(OrderState::Rejected, Some(Duration::hours(-1)), &clock);

		let mut mock = MockOrderLifecycle::new();
		returning_order(&mut mock, order);
		mock.expect_abandon().never();
		mock.expect_reject().never();

		job(mock, clock)
			.perform("order-1", OrderState::Rejected)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_lost_race_is_silent() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let order = order_in(OrderState::Submitted, Some(Duration::hours(-1)), &clock);

		let mut mock = MockOrderLifecycle::new();
		returning_order(&mut mock, order);
		mock.expect_reject().times(1).returning(|_, _| {
			Err(OrderServiceError::Transition(TransitionError::invalid_state(
				OrderState::Approved,
			)))
		});

		assert!(job(mock, clock)
			.perform("order-1", OrderState::Submitted)
			.await
			.is_ok());
	}

	#[tokio::test]
	async fn test_infrastructure_failures_are_errors() {
		let clock = Arc::new(ManualClock::new(Utc::now()));
		let mut mock = MockOrderLifecycle::new();
		mock.expect_get_order()
			.returning(|id| Err(OrderServiceError::OrderNotFound(id.to_string())));
		assert!(matches!(
			job(mock, clock.clone())
				.perform("order-1", OrderState::Pending)
				.await,
			Err(ExpirationError::OrderNotFound(_))
		));

		let order = order_in(OrderState::Pending, Some(Duration::hours(-1)), &clock);
		let mut mock = MockOrderLifecycle::new();
		returning_order(&mut mock, order);
		mock.expect_abandon()
			.returning(|_, _| Err(OrderServiceError::Storage("disk full".into())));
		assert!(matches!(
			job(mock, clock)
				.perform("order-1", OrderState::Pending)
				.await,
			Err(ExpirationError::Storage(_))
		));
	}

	#[tokio::test]
	async fn test_repeated_callbacks_against_real_service() {
		let h = harness();
		let (order, _) = submitted_order(&h).await;
		let job = ExpireOrderJob::new(h.service.clone(), h.clock.clone());

		job.perform(&order.id, OrderState::Submitted).await.unwrap();
		assert_eq!(
			h.service.get_order(&order.id).await.unwrap().state,
			OrderState::Submitted
		);

		h.clock.advance(Duration::hours(48));
		job.perform(&order.id, OrderState::Submitted).await.unwrap();
		let rejected = h.service.get_order(&order.id).await.unwrap();
		assert_eq!(rejected.state, OrderState::Rejected);

		// Duplicate delivery changes nothing
		job.perform(&order.id, OrderState::Submitted).await.unwrap();
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), rejected);
		// Nor does a stale callback from an earlier state
		job.perform(&order.id, OrderState::Pending).await.unwrap();
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), rejected);
	}

	#[tokio::test]
	async fn test_pending_callback_leaves_expired_submitted_order() {
		let h = harness();
		let (order, _) = submitted_order(&h).await;
		let job = ExpireOrderJob::new(h.service.clone(), h.clock.clone());

		h.clock.advance(Duration::hours(48));
		let before = h.service.get_order(&order.id).await.unwrap();
		assert!(before.is_expired_at(h.clock.now()));

		job.perform(&order.id, OrderState::Pending).await.unwrap();
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), before);
	}
}
