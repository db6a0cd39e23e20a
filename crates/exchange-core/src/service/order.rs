//! Order service for caller-initiated and internal lifecycle operations.
//!
//! Each operation validates against the persisted order inside a conditional
//! update, then schedules the new state's expiration and publishes the change
//! on the event bus. A refused transition comes back as
//! [`OrderServiceError::Transition`] and leaves nothing modified.

use crate::engine::event_bus::EventBus;
use crate::expiration::{ExpirationRequest, ExpirationScheduler};
use crate::state::order::StateChange;
use crate::state::{OrderStateError, OrderStateMachine};
use crate::validator::TransitionValidator;
use exchange_types::{
	truncate_id, Actor, ExchangeEvent, Offer, Order, OrderEvent, OrderState, Party, Side,
	TransitionError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during order service operations.
#[derive(Debug, Error)]
pub enum OrderServiceError {
	/// The referenced offer does not exist.
	#[error("Offer not found: {0}")]
	OfferNotFound(String),
	/// The referenced order does not exist.
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// A business rule refused the transition.
	#[error(transparent)]
	Transition(#[from] TransitionError),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStateError> for OrderServiceError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => OrderServiceError::OrderNotFound(id),
			OrderStateError::OfferNotFound(id) => OrderServiceError::OfferNotFound(id),
			OrderStateError::Transition(e) => OrderServiceError::Transition(e),
			OrderStateError::Storage(e) => OrderServiceError::Storage(e.to_string()),
		}
	}
}

/// Orchestrates validated order transitions and their side effects.
pub struct OrderService {
	state_machine: Arc<OrderStateMachine>,
	scheduler: Arc<dyn ExpirationScheduler>,
	event_bus: EventBus,
}

impl OrderService {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		scheduler: Arc<dyn ExpirationScheduler>,
		event_bus: EventBus,
	) -> Self {
		Self {
			state_machine,
			scheduler,
			event_bus,
		}
	}

	/// Creates a pending order between `seller` and `buyer`.
	///
	/// Parties of the same type are refused with `invalid_parties` and
	/// nothing is stored.
	#[instrument(skip_all, fields(seller_id = %seller.id, buyer_id = %buyer.id))]
	pub async fn create_order(&self, seller: Party, buyer: Party) -> Result<Order, OrderServiceError> {
		TransitionValidator::validate_order_creation(&seller, &buyer)?;
		let order = self.state_machine.create_order(seller, buyer).await?;
		tracing::info!(order_id = %truncate_id(&order.id), "Order created");

		self.schedule_expiration(&order).await;
		self.event_bus
			.publish(ExchangeEvent::Order(OrderEvent::Created {
				order_id: order.id.clone(),
			}))
			.ok();
		Ok(order)
	}

	/// Makes a new offer on the order from `side` and makes it the last offer.
	///
	/// The offer record is written first. If the order changes before the
	/// last-offer pointer is advanced and the rules no longer allow the offer,
	/// the stored offer stays unreferenced and can never be accepted.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn create_offer(
		&self,
		actor: &Actor,
		order_id: &str,
		side: Side,
	) -> Result<(Offer, Order), OrderServiceError> {
		let order = self.state_machine.get_order(order_id).await?;
		TransitionValidator::validate_offer_creation(&order, side, actor)?;

		let offer = Offer::new(&order.id, order.party(side), self.state_machine.now());
		self.state_machine.store_offer(&offer).await?;

		let order = self
			.state_machine
			.update_order_with(order_id, |order, _| {
				TransitionValidator::validate_offer_creation(order, side, actor)?;
				order.last_offer_id = Some(offer.id.clone());
				Ok(())
			})
			.await?;

		tracing::info!(offer_id = %truncate_id(&offer.id), from = %offer.from_type, "Offer created");
		self.event_bus
			.publish(ExchangeEvent::Order(OrderEvent::OfferCreated {
				order_id: order.id.clone(),
				offer_id: offer.id.clone(),
			}))
			.ok();
		Ok((offer, order))
	}

	/// Buyer submits a pending order carrying at least one offer.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn submit(&self, actor: &Actor, order_id: &str) -> Result<Order, OrderServiceError> {
		let change = self
			.state_machine
			.transition(order_id, OrderState::Submitted, |order, _| {
				TransitionValidator::validate_submit(order, actor)
			})
			.await?;
		Ok(self.record_change(change).await)
	}

	/// Seller accepts an offer, approving its order.
	#[instrument(skip_all, fields(offer_id = %truncate_id(offer_id)))]
	pub async fn accept_offer(
		&self,
		actor: &Actor,
		offer_id: &str,
	) -> Result<Order, OrderServiceError> {
		let offer = self.state_machine.get_offer(offer_id).await?;
		let change = self
			.state_machine
			.transition(&offer.order_id, OrderState::Approved, |order, _| {
				TransitionValidator::validate_seller_accept(order, &offer, actor)
			})
			.await?;
		Ok(self.record_change(change).await)
	}

	/// Moves a pending order to abandoned.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn abandon(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.force(order_id, OrderState::Abandoned).await
	}

	/// Moves a submitted or approved order to rejected.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn reject(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.force(order_id, OrderState::Rejected).await
	}

	/// Completes an approved order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn fulfill(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.force(order_id, OrderState::Fulfilled).await
	}

	/// Moves an order to `to` only if, at write time, it is still in
	/// `expected_state` and that state has expired.
	///
	/// Any other situation is refused with `invalid_state`.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), expected = %expected_state))]
	pub async fn expire(
		&self,
		order_id: &str,
		expected_state: OrderState,
		to: OrderState,
	) -> Result<Order, OrderServiceError> {
		let change = self
			.state_machine
			.transition(order_id, to, |order, now| {
				if order.state != expected_state || !order.is_expired_at(now) {
					return Err(TransitionError::invalid_state(order.state));
				}
				Ok(())
			})
			.await?;
		Ok(self.record_change(change).await)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	pub async fn get_offer(&self, offer_id: &str) -> Result<Offer, OrderServiceError> {
		Ok(self.state_machine.get_offer(offer_id).await?)
	}

	/// Transition limited only by the transition table.
	async fn force(&self, order_id: &str, to: OrderState) -> Result<Order, OrderServiceError> {
		let change = self
			.state_machine
			.transition(order_id, to, |_, _| Ok(()))
			.await?;
		Ok(self.record_change(change).await)
	}

	/// Side effects of a committed state change.
	async fn record_change(&self, change: StateChange) -> Order {
		let StateChange { from, order } = change;
		tracing::info!(
			order_id = %truncate_id(&order.id),
			from = %from,
			to = %order.state,
			"Order state changed"
		);

		self.schedule_expiration(&order).await;
		self.event_bus
			.publish(ExchangeEvent::Order(OrderEvent::StateChanged {
				order_id: order.id.clone(),
				from,
				to: order.state,
				state_expires_at: order.state_expires_at,
			}))
			.ok();
		order
	}

	async fn schedule_expiration(&self, order: &Order) {
		let Some(run_at) = order.state_expires_at else {
			return;
		};
		let request = ExpirationRequest {
			order_id: order.id.clone(),
			expected_state: order.state,
			run_at,
		};
		// The state change is already committed; recovery re-arms it on restart
		if let Err(e) = self.scheduler.schedule(request).await {
			tracing::error!(
				order_id = %truncate_id(&order.id),
				error = %e,
				"Failed to schedule expiration"
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::Clock;
	use crate::test_utils::{buyer_actor, harness, seller_actor, submitted_order};
	use chrono::Duration;
	use exchange_types::{ErrorCode, PartyType};

	fn transition_code<T: std::fmt::Debug>(result: Result<T, OrderServiceError>) -> ErrorCode {
		match result {
			Err(OrderServiceError::Transition(e)) => e.code,
			other => panic!("expected a transition error, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_accept_approves_submitted_order() {
		let h = harness();
		let (order, offer) = submitted_order(&h).await;
		let mut events = h.event_bus.subscribe();

		let approved = h.service.accept_offer(&seller_actor(), &offer.id).await.unwrap();

		assert_eq!(approved.id, order.id);
		assert_eq!(approved.state, OrderState::Approved);
		assert_eq!(
			approved.state_expires_at,
			Some(h.clock.now() + Duration::hours(168))
		);
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), approved);

		let scheduled = h.scheduler.requests();
		assert_eq!(
			scheduled.last().unwrap(),
			&ExpirationRequest {
				order_id: order.id.clone(),
				expected_state: OrderState::Approved,
				run_at: approved.state_expires_at.unwrap(),
			}
		);

		match events.recv().await.unwrap() {
			ExchangeEvent::Order(OrderEvent::StateChanged { from, to, .. }) => {
				assert_eq!(from, OrderState::Submitted);
				assert_eq!(to, OrderState::Approved);
			},
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_accept_refusals_do_not_mutate() {
		let h = harness();
		let (order, offer) = submitted_order(&h).await;
		let before = h.service.get_order(&order.id).await.unwrap();
		let scheduled_before = h.scheduler.requests().len();

		// Caller without any capability over the seller
		let stranger = exchange_types::Actor::new(Some("user-9".into()), ["gallery-9"]);
		assert_eq!(
			transition_code(h.service.accept_offer(&stranger, &offer.id).await),
			ErrorCode::NotFound
		);
		// The buyer is not the seller either
		assert_eq!(
			transition_code(h.service.accept_offer(&buyer_actor(), &offer.id).await),
			ErrorCode::NotFound
		);

		assert_eq!(h.service.get_order(&order.id).await.unwrap(), before);
		assert_eq!(h.scheduler.requests().len(), scheduled_before);
	}

	#[tokio::test]
	async fn test_accept_twice_is_invalid_state() {
		let h = harness();
		let (_, offer) = submitted_order(&h).await;
		h.service.accept_offer(&seller_actor(), &offer.id).await.unwrap();

		let err = h
			.service
			.accept_offer(&seller_actor(), &offer.id)
			.await
			.unwrap_err();
		match err {
			OrderServiceError::Transition(e) => {
				assert_eq!(e.code, ErrorCode::InvalidState);
				assert_eq!(e.data.unwrap()["state"], "approved");
			},
			other => panic!("unexpected error {other}"),
		}
	}

	#[tokio::test]
	async fn test_superseded_offer_is_never_acceptable() {
		let h = harness();
		let (order, first) = submitted_order(&h).await;

		let (counter, _) = h
			.service
			.create_offer(&seller_actor(), &order.id, Side::Seller)
			.await
			.unwrap();
		let (newest, updated) = h
			.service
			.create_offer(&buyer_actor(), &order.id, Side::Buyer)
			.await
			.unwrap();
		assert_eq!(updated.last_offer_id.as_deref(), Some(newest.id.as_str()));
		assert_eq!(updated.state, OrderState::Submitted);

		for stale in [&first, &counter] {
			assert_eq!(
				transition_code(h.service.accept_offer(&seller_actor(), &stale.id).await),
				ErrorCode::NotLastOffer
			);
			assert_eq!(h.service.get_order(&order.id).await.unwrap(), updated);
		}

		let approved = h
			.service
			.accept_offer(&seller_actor(), &newest.id)
			.await
			.unwrap();
		assert_eq!(approved.state, OrderState::Approved);
	}

	#[tokio::test]
	async fn test_seller_cannot_accept_own_offer() {
		let h = harness();
		let (order, _) = submitted_order(&h).await;
		let (counter, before) = h
			.service
			.create_offer(&seller_actor(), &order.id, Side::Seller)
			.await
			.unwrap();
		assert_eq!(counter.from_type, PartyType::Gallery);
		let scheduled_before = h.scheduler.requests().len();

		assert_eq!(
			transition_code(h.service.accept_offer(&seller_actor(), &counter.id).await),
			ErrorCode::CannotAcceptOffer
		);
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), before);
		assert_eq!(h.scheduler.requests().len(), scheduled_before);
	}

	#[tokio::test]
	async fn test_accept_on_pending_order_is_invalid_state() {
		let h = harness();
		let order = h
			.service
			.create_order(crate::test_utils::gallery(), crate::test_utils::user())
			.await
			.unwrap();
		let (offer, before) = h
			.service
			.create_offer(&buyer_actor(), &order.id, Side::Buyer)
			.await
			.unwrap();
		assert_eq!(before.state, OrderState::Pending);

		let err = h
			.service
			.accept_offer(&seller_actor(), &offer.id)
			.await
			.unwrap_err();
		match err {
			OrderServiceError::Transition(e) => {
				assert_eq!(e.code, ErrorCode::InvalidState);
				assert_eq!(e.data.unwrap()["state"], "pending");
			},
			other => panic!("unexpected error {other}"),
		}
		assert_eq!(h.service.get_order(&order.id).await.unwrap(), before);
	}

	#[tokio::test]
	async fn test_order_between_same_party_types_is_refused() {
		let h = harness();
		let mut events = h.event_bus.subscribe();

		let result = h
			.service
			.create_order(
				exchange_types::Party::new("user-1", PartyType::User),
				exchange_types::Party::new("user-2", PartyType::User),
			)
			.await;
		assert_eq!(transition_code(result), ErrorCode::InvalidParties);

		assert!(h.state_machine.all_orders().await.unwrap().is_empty());
		assert!(h.scheduler.requests().is_empty());
		assert!(events.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_unknown_offer_is_not_a_typed_error() {
		let h = harness();
		assert!(matches!(
			h.service.accept_offer(&seller_actor(), "-1").await,
			Err(OrderServiceError::OfferNotFound(id)) if id == "-1"
		));
	}

	#[tokio::test]
	async fn test_submit_requires_an_offer() {
		let h = harness();
		let order = h
			.service
			.create_order(crate::test_utils::gallery(), crate::test_utils::user())
			.await
			.unwrap();
		assert_eq!(
			transition_code(h.service.submit(&buyer_actor(), &order.id).await),
			ErrorCode::MissingOffer
		);
		assert_eq!(
			transition_code(h.service.submit(&seller_actor(), &order.id).await),
			ErrorCode::NotFound
		);

		h.service
			.create_offer(&buyer_actor(), &order.id, Side::Buyer)
			.await
			.unwrap();
		let submitted = h.service.submit(&buyer_actor(), &order.id).await.unwrap();
		assert_eq!(submitted.state, OrderState::Submitted);
		assert_eq!(
			submitted.state_expires_at,
			Some(h.clock.now() + Duration::hours(48))
		);
	}

	#[tokio::test]
	async fn test_internal_transitions_follow_table() {
		let h = harness();
		let (order, offer) = submitted_order(&h).await;

		assert_eq!(
			transition_code(h.service.abandon(&order.id).await),
			ErrorCode::InvalidState
		);
		assert_eq!(
			transition_code(h.service.fulfill(&order.id).await),
			ErrorCode::InvalidState
		);

		h.service.accept_offer(&seller_actor(), &offer.id).await.unwrap();
		let fulfilled = h.service.fulfill(&order.id).await.unwrap();
		assert_eq!(fulfilled.state, OrderState::Fulfilled);
		assert_eq!(fulfilled.state_expires_at, None);

		// Nothing leaves a terminal state
		assert_eq!(
			transition_code(h.service.reject(&order.id).await),
			ErrorCode::InvalidState
		);
		assert_eq!(
			transition_code(h.service.create_offer(&buyer_actor(), &order.id, Side::Buyer).await),
			ErrorCode::InvalidState
		);
	}

	#[tokio::test]
	async fn test_expire_requires_expected_state_and_deadline() {
		let h = harness();
		let (order, _) = submitted_order(&h).await;

		// Too early
		assert_eq!(
			transition_code(
				h.service
					.expire(&order.id, OrderState::Submitted, OrderState::Rejected)
					.await
			),
			ErrorCode::InvalidState
		);

		h.clock.advance(Duration::hours(48));
		// Wrong expectation
		assert_eq!(
			transition_code(
				h.service
					.expire(&order.id, OrderState::Pending, OrderState::Abandoned)
					.await
			),
			ErrorCode::InvalidState
		);

		let rejected = h
			.service
			.expire(&order.id, OrderState::Submitted, OrderState::Rejected)
			.await
			.unwrap();
		assert_eq!(rejected.state, OrderState::Rejected);
	}

	#[tokio::test]
	async fn test_accept_racing_expiration_has_one_winner() {
		let h = harness();
		let (order, offer) = submitted_order(&h).await;
		h.clock.advance(Duration::hours(49));

		let seller = seller_actor();
		let (accepted, expired) = tokio::join!(
			h.service.accept_offer(&seller, &offer.id),
			h.service
				.expire(&order.id, OrderState::Submitted, OrderState::Rejected)
		);

		let stored = h.service.get_order(&order.id).await.unwrap();
		match (accepted, expired) {
			(Ok(o), Err(OrderServiceError::Transition(_))) => {
				assert_eq!(o.state, OrderState::Approved);
				assert_eq!(stored.state, OrderState::Approved);
			},
			(Err(OrderServiceError::Transition(_)), Ok(o)) => {
				assert_eq!(o.state, OrderState::Rejected);
				assert_eq!(stored.state, OrderState::Rejected);
			},
			other => panic!("expected exactly one winner, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_create_order_schedules_pending_expiration() {
		let h = harness();
		let mut events = h.event_bus.subscribe();
		let order = h
			.service
			.create_order(crate::test_utils::gallery(), crate::test_utils::user())
			.await
			.unwrap();

		assert_eq!(order.state, OrderState::Pending);
		assert_eq!(
			h.scheduler.requests(),
			vec![ExpirationRequest {
				order_id: order.id.clone(),
				expected_state: OrderState::Pending,
				run_at: h.clock.now() + Duration::hours(48),
			}]
		);
		assert_eq!(
			events.recv().await.unwrap(),
			ExchangeEvent::Order(OrderEvent::Created {
				order_id: order.id.clone()
			})
		);
	}
}
