//! Transition rules for caller-initiated lifecycle changes.
//!
//! Validation is pure: it looks at the order, the offer and the caller's
//! capability and either allows the change or names the rule that refused
//! it. Permission failures surface as `not_found` so a caller cannot learn
//! about orders it has no access to.

use exchange_types::{Actor, Offer, Order, OrderState, Party, Side, TransitionError};

/// Decides whether a requested transition is legal.
pub struct TransitionValidator;

impl TransitionValidator {
	/// Seller accepting the offer `offer` on `order`.
	///
	/// Checks run in a fixed order and the first failure wins: state,
	/// permission, staleness, then authorship.
	pub fn validate_seller_accept(
		order: &Order,
		offer: &Offer,
		actor: &Actor,
	) -> Result<(), TransitionError> {
		if order.state != OrderState::Submitted {
			return Err(TransitionError::invalid_state(order.state));
		}
		if !actor.can_act_as_seller(order) {
			return Err(TransitionError::not_found());
		}
		if order.last_offer_id.as_deref() != Some(offer.id.as_str()) {
			return Err(TransitionError::not_last_offer(
				&offer.id,
				order.last_offer_id.as_deref(),
			));
		}
		if offer.from_type == order.seller_type {
			return Err(TransitionError::cannot_accept_offer(offer.from_type));
		}
		Ok(())
	}

	/// A party making a new offer from `side`.
	pub fn validate_offer_creation(
		order: &Order,
		side: Side,
		actor: &Actor,
	) -> Result<(), TransitionError> {
		if !matches!(order.state, OrderState::Pending | OrderState::Submitted) {
			return Err(TransitionError::invalid_state(order.state));
		}
		if !actor.can_act_for(&order.party(side)) {
			return Err(TransitionError::not_found());
		}
		Ok(())
	}

	/// Parties of a new order.
	///
	/// Offer authorship is told apart by party type, so both sides of an
	/// order must have different types.
	pub fn validate_order_creation(seller: &Party, buyer: &Party) -> Result<(), TransitionError> {
		if seller.party_type == buyer.party_type {
			return Err(TransitionError::invalid_parties(
				seller.party_type,
				buyer.party_type,
			));
		}
		Ok(())
	}

	/// Buyer submitting a pending order.
	pub fn validate_submit(order: &Order, actor: &Actor) -> Result<(), TransitionError> {
		if order.state != OrderState::Pending {
			return Err(TransitionError::invalid_state(order.state));
		}
		if !actor.can_act_as_buyer(order) {
			return Err(TransitionError::not_found());
		}
		if order.last_offer_id.is_none() {
			return Err(TransitionError::missing_offer());
		}
		Ok(())
	}
}
