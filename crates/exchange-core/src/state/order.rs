//! Order state machine implementation.
//!
//! Manages order state transitions with validation, ensuring orders move through
//! valid lifecycle states: Pending -> Submitted -> Approved -> Fulfilled, with
//! Abandoned and Rejected as the timeout exits. Every write is a conditional
//! update, so a precondition checked here still holds when the record changes.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use exchange_config::ExpirationConfig;
use exchange_storage::{StorageError, StorageService};
use exchange_types::{Offer, Order, OrderState, Party, StorageKey, TransitionError};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Transition(#[from] TransitionError),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Offer not found: {0}")]
	OfferNotFound(String),
}

/// Result of a successful state change.
#[derive(Debug, Clone)]
pub struct StateChange {
	/// State the order was in when the update was applied.
	pub from: OrderState,
	/// The order as persisted after the update.
	pub order: Order,
}

// Each state maps to the states it may move to; terminal states map to nothing
static TRANSITIONS: Lazy<HashMap<OrderState, HashSet<OrderState>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderState::Pending,
		HashSet::from([OrderState::Submitted, OrderState::Abandoned]),
	);
	m.insert(
		OrderState::Submitted,
		HashSet::from([OrderState::Approved, OrderState::Rejected]),
	);
	m.insert(
		OrderState::Approved,
		HashSet::from([OrderState::Fulfilled, OrderState::Rejected]),
	);
	m.insert(OrderState::Fulfilled, HashSet::new());
	m.insert(OrderState::Rejected, HashSet::new());
	m.insert(OrderState::Abandoned, HashSet::new());
	m
});

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	expiration: ExpirationConfig,
}

impl OrderStateMachine {
	pub fn new(
		storage: Arc<StorageService>,
		clock: Arc<dyn Clock>,
		expiration: ExpirationConfig,
	) -> Self {
		Self {
			storage,
			clock,
			expiration,
		}
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderState, to: OrderState) -> bool {
		TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
	}

	/// Deadline for an order entering `state` at `now`.
	fn expires_at(&self, state: OrderState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
		self.expiration
			.state_duration(state)
			.and_then(|d| chrono::Duration::from_std(d).ok())
			.map(|d| now + d)
	}

	/// Creates and stores a new pending order.
	pub async fn create_order(&self, seller: Party, buyer: Party) -> Result<Order, OrderStateError> {
		let now = self.clock.now();
		let mut order = Order::new(seller, buyer, now);
		order.state_expires_at = self.expires_at(order.state, now);
		self.store_order(&order).await?;
		Ok(order)
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => other.into(),
			})
	}

	/// Stores an order, overwriting any previous version
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(Into::into)
	}

	pub async fn get_offer(&self, offer_id: &str) -> Result<Offer, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Offers.as_str(), offer_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OfferNotFound(offer_id.to_string()),
				other => other.into(),
			})
	}

	pub async fn store_offer(&self, offer: &Offer) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Offers.as_str(), &offer.id, offer)
			.await
			.map_err(Into::into)
	}

	/// Lists every stored order.
	pub async fn all_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		let orders = self
			.storage
			.retrieve_all::<Order>(StorageKey::Orders.as_str())
			.await?;
		Ok(orders.into_iter().map(|(_, order)| order).collect())
	}

	/// Conditionally updates an order with a closure and persists it.
	///
	/// The updater sees the freshly read record and the current time. It runs
	/// again whenever a concurrent writer got there first; returning an error
	/// aborts without writing.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		mut updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnMut(&mut Order, DateTime<Utc>) -> Result<(), TransitionError>,
	{
		self.storage
			.update_with(
				StorageKey::Orders.as_str(),
				order_id,
				|order: &mut Order| -> Result<(), OrderStateError> {
					let now = self.clock.now();
					updater(order, now)?;
					order.updated_at = now;
					Ok(())
				},
			)
			.await
			.map_err(|e| match e {
				OrderStateError::Storage(StorageError::NotFound) => {
					OrderStateError::OrderNotFound(order_id.to_string())
				},
				other => other,
			})
	}

	/// Moves an order to `to` if `guard` accepts the persisted record and the
	/// transition table allows it.
	///
	/// Stamps `state_updated_at` and the new state's expiry.
	pub async fn transition<G>(
		&self,
		order_id: &str,
		to: OrderState,
		guard: G,
	) -> Result<StateChange, OrderStateError>
	where
		G: Fn(&Order, DateTime<Utc>) -> Result<(), TransitionError>,
	{
		let mut from = None;
		let order = self
			.update_order_with(order_id, |order, now| {
				guard(&*order, now)?;
				if !Self::is_valid_transition(order.state, to) {
					return Err(TransitionError::invalid_state(order.state));
				}
				from = Some(order.state);
				order.state = to;
				order.state_updated_at = now;
				order.state_expires_at = self.expires_at(to, now);
				Ok(())
			})
			.await?;

		Ok(StateChange {
			from: from.unwrap_or(order.state),
			order,
		})
	}
}
