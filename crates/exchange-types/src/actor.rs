//! Caller capability types.
//!
//! An [`Actor`] is resolved by whatever authenticates the request and is then
//! passed explicitly into validation. Nothing in the lifecycle reads an
//! implicit "current user".

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Order, Party, PartyType};

/// The identities a caller is authorised to act for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	/// Identifier of the calling user, if the caller is a user.
	pub user_id: Option<String>,
	/// Partner identifiers the caller may act on behalf of.
	#[serde(default)]
	pub partner_ids: HashSet<String>,
}

impl Actor {
	pub fn new<I, S>(user_id: Option<String>, partner_ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			user_id,
			partner_ids: partner_ids.into_iter().map(Into::into).collect(),
		}
	}

	/// An actor acting only as an individual user.
	pub fn user(user_id: impl Into<String>) -> Self {
		Self {
			user_id: Some(user_id.into()),
			partner_ids: HashSet::new(),
		}
	}

	/// Returns true when this actor may act for the given party.
	///
	/// User parties are matched against the user id, every organisational
	/// party type against the partner set.
	pub fn can_act_for(&self, party: &Party) -> bool {
		match party.party_type {
			PartyType::User => self.user_id.as_deref() == Some(party.id.as_str()),
			PartyType::Gallery | PartyType::Partner => self.partner_ids.contains(&party.id),
		}
	}

	pub fn can_act_as_seller(&self, order: &Order) -> bool {
		self.can_act_for(&order.seller())
	}

	pub fn can_act_as_buyer(&self, order: &Order) -> bool {
		self.can_act_for(&order.buyer())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_partner_capability() {
		let actor = Actor::new(Some("user-1".into()), ["gallery-1", "gallery-2"]);
		assert!(actor.can_act_for(&Party::new("gallery-2", PartyType::Gallery)));
		assert!(!actor.can_act_for(&Party::new("gallery-3", PartyType::Gallery)));
		assert!(actor.can_act_for(&Party::new("user-1", PartyType::User)));
	}

	#[test]
	fn test_user_id_does_not_grant_partner_access() {
		let actor = Actor::user("gallery-1");
		assert!(!actor.can_act_for(&Party::new("gallery-1", PartyType::Gallery)));
		assert!(!Actor::default().can_act_for(&Party::new("user-1", PartyType::User)));
	}
}
