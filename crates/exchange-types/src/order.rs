//! Order types for the exchange lifecycle.
//!
//! This module defines the order aggregate, its closed set of lifecycle
//! states, and the party descriptors that identify the buyer and seller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of an order.
///
/// `Abandoned`, `Rejected` and `Fulfilled` are terminal: no transition out
/// of them is defined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
	/// Order has been created and is waiting for the buyer to submit it.
	Pending,
	/// Order has been submitted by the buyer and awaits the seller.
	Submitted,
	/// The seller accepted the last offer.
	Approved,
	/// The approved order was completed.
	Fulfilled,
	/// The order timed out after submission or approval.
	Rejected,
	/// The order timed out before it was ever submitted.
	Abandoned,
}

impl OrderState {
	/// Returns the wire representation of the state.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderState::Pending => "pending",
			OrderState::Submitted => "submitted",
			OrderState::Approved => "approved",
			OrderState::Fulfilled => "fulfilled",
			OrderState::Rejected => "rejected",
			OrderState::Abandoned => "abandoned",
		}
	}

	/// Returns true when no transition out of this state exists.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderState::Fulfilled | OrderState::Rejected | OrderState::Abandoned
		)
	}

	/// Returns an iterator over all states.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Pending,
			Self::Submitted,
			Self::Approved,
			Self::Fulfilled,
			Self::Rejected,
			Self::Abandoned,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Kind of counterparty taking part in an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
	/// An individual collector.
	User,
	/// A gallery selling through the platform.
	Gallery,
	/// Any other organisational partner.
	Partner,
}

impl PartyType {
	pub fn as_str(&self) -> &'static str {
		match self {
			PartyType::User => "user",
			PartyType::Gallery => "gallery",
			PartyType::Partner => "partner",
		}
	}
}

impl fmt::Display for PartyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A party identifier together with its type discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Party {
	pub id: String,
	#[serde(rename = "type")]
	pub party_type: PartyType,
}

impl Party {
	pub fn new(id: impl Into<String>, party_type: PartyType) -> Self {
		Self {
			id: id.into(),
			party_type,
		}
	}
}

/// Side of an order a party is acting on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
	Buyer,
	Seller,
}

/// A transaction between a buyer and a seller.
///
/// The state only changes through the order state machine; callers never
/// write it directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current lifecycle state.
	pub state: OrderState,
	pub seller_id: String,
	pub seller_type: PartyType,
	pub buyer_id: String,
	pub buyer_type: PartyType,
	/// Most recently created offer for this order, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_offer_id: Option<String>,
	/// Moment after which the current state may be forcibly expired.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state_expires_at: Option<DateTime<Utc>>,
	/// When the order entered its current state.
	pub state_updated_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Creates a new pending order with a fresh identifier.
	pub fn new(seller: Party, buyer: Party, now: DateTime<Utc>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			state: OrderState::Pending,
			seller_id: seller.id,
			seller_type: seller.party_type,
			buyer_id: buyer.id,
			buyer_type: buyer.party_type,
			last_offer_id: None,
			state_expires_at: None,
			state_updated_at: now,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn seller(&self) -> Party {
		Party::new(self.seller_id.clone(), self.seller_type)
	}

	pub fn buyer(&self) -> Party {
		Party::new(self.buyer_id.clone(), self.buyer_type)
	}

	/// Returns the party on the given side of the order.
	pub fn party(&self, side: Side) -> Party {
		match side {
			Side::Buyer => self.buyer(),
			Side::Seller => self.seller(),
		}
	}

	/// Returns true when a state expiry is recorded and `now` has reached it.
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.state_expires_at.is_some_and(|expires_at| now >= expires_at)
	}
}
