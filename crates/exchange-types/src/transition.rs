//! Typed business errors for rejected lifecycle transitions.
//!
//! A [`TransitionError`] is a value, not a fault: it is returned to the caller
//! inside the response envelope and never leaves any state mutated behind.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::{OrderState, PartyType};

/// Category of a transition error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
	/// A business rule rejected the request.
	Validation,
}

impl fmt::Display for ErrorType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ErrorType::Validation => f.write_str("validation"),
		}
	}
}

/// Machine readable reason for a rejected transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	/// The order is not in a state that allows the requested transition.
	InvalidState,
	/// The target does not exist or the caller may not act on it.
	NotFound,
	/// The targeted offer has been superseded by a newer one.
	NotLastOffer,
	/// A party tried to accept an offer it made itself.
	CannotAcceptOffer,
	/// The order has no offer to submit.
	MissingOffer,
	/// Seller and buyer cannot be told apart by party type.
	InvalidParties,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::InvalidState => "invalid_state",
			ErrorCode::NotFound => "not_found",
			ErrorCode::NotLastOffer => "not_last_offer",
			ErrorCode::CannotAcceptOffer => "cannot_accept_offer",
			ErrorCode::MissingOffer => "missing_offer",
			ErrorCode::InvalidParties => "invalid_parties",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A structured, user-facing rejection of a lifecycle transition.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{error_type} error: {code}")]
pub struct TransitionError {
	#[serde(rename = "type")]
	pub error_type: ErrorType,
	pub code: ErrorCode,
	#[serde(default)]
	pub data: Option<serde_json::Value>,
}

impl TransitionError {
	pub fn validation(code: ErrorCode) -> Self {
		Self {
			error_type: ErrorType::Validation,
			code,
			data: None,
		}
	}

	pub fn with_data(mut self, data: serde_json::Value) -> Self {
		self.data = Some(data);
		self
	}

	pub fn invalid_state(state: OrderState) -> Self {
		Self::validation(ErrorCode::InvalidState).with_data(json!({ "state": state }))
	}

	/// Used both for genuinely missing targets and for permission failures,
	/// so unauthorised callers learn nothing about existence.
	pub fn not_found() -> Self {
		Self::validation(ErrorCode::NotFound)
	}

	pub fn not_last_offer(offer_id: &str, last_offer_id: Option<&str>) -> Self {
		Self::validation(ErrorCode::NotLastOffer).with_data(json!({
			"offer_id": offer_id,
			"last_offer_id": last_offer_id,
		}))
	}

	pub fn cannot_accept_offer(from_type: PartyType) -> Self {
		Self::validation(ErrorCode::CannotAcceptOffer).with_data(json!({ "from_type": from_type }))
	}

	pub fn missing_offer() -> Self {
		Self::validation(ErrorCode::MissingOffer)
	}

	pub fn invalid_parties(seller_type: PartyType, buyer_type: PartyType) -> Self {
		Self::validation(ErrorCode::InvalidParties).with_data(json!({
			"seller_type": seller_type,
			"buyer_type": buyer_type,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_serializes_with_type_code_and_data() {
		let error = TransitionError::invalid_state(OrderState::Pending);
		let value = serde_json::to_value(&error).unwrap();
		assert_eq!(value["type"], "validation");
		assert_eq!(value["code"], "invalid_state");
		assert_eq!(value["data"]["state"], "pending");
	}

	#[test]
	fn test_not_found_carries_no_data() {
		let value = serde_json::to_value(TransitionError::not_found()).unwrap();
		assert_eq!(value["code"], "not_found");
		assert!(value["data"].is_null());
		assert_eq!(TransitionError::not_found().to_string(), "validation error: not_found");
	}
}
