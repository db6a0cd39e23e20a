//! Event types for inter-service communication.
//!
//! Lifecycle changes are published on the engine's event bus so that other
//! subsystems (payments, notifications) can react without the order service
//! knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::OrderState;

/// Main event type encompassing all exchange events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExchangeEvent {
	/// Events from the order service.
	Order(OrderEvent),
	/// Events from the expiration runner.
	Expiration(ExpirationEvent),
}

/// Events related to order processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderEvent {
	/// A new order has been stored.
	Created { order_id: String },
	/// An offer has been made and became the order's last offer.
	OfferCreated { order_id: String, offer_id: String },
	/// The order moved from one state to another.
	StateChanged {
		order_id: String,
		from: OrderState,
		to: OrderState,
		state_expires_at: Option<DateTime<Utc>>,
	},
}

/// Events related to expiration callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExpirationEvent {
	/// An expiration callback ran to completion, whether or not it
	/// changed anything.
	Processed {
		order_id: String,
		expected_state: OrderState,
	},
}
