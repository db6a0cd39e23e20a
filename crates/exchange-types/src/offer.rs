//! Offer types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Party, PartyType};

/// An immutable proposal attached to an order.
///
/// Offers are never deleted; a newer offer supersedes older ones by becoming
/// the order's last offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
	/// Unique identifier for this offer.
	pub id: String,
	/// The order this offer belongs to.
	pub order_id: String,
	/// Identifier of the party that made the offer.
	pub from_id: String,
	/// Type of the party that made the offer.
	pub from_type: PartyType,
	pub created_at: DateTime<Utc>,
}

impl Offer {
	pub fn new(order_id: impl Into<String>, from: Party, now: DateTime<Utc>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			order_id: order_id.into(),
			from_id: from.id,
			from_type: from.party_type,
			created_at: now,
		}
	}

	pub fn from_party(&self) -> Party {
		Party::new(self.from_id.clone(), self.from_type)
	}
}
