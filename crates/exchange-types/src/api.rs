//! API types for the exchange HTTP adapter.
//!
//! Mutations answer with an `OrderOrError` envelope for every business
//! outcome. Only unresolvable references, malformed input and infrastructure
//! failures are reported through [`APIError`] and an HTTP status code.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Order, OrderState, Party, Side, TransitionError};

/// Minimal order projection returned by mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
	pub id: String,
	pub state: OrderState,
}

impl From<&Order> for OrderSummary {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id.clone(),
			state: order.state,
		}
	}
}

/// Either the updated order or the typed reason the mutation was refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderOrError {
	#[serde(rename = "order")]
	Order(OrderSummary),
	#[serde(rename = "error")]
	Error(TransitionError),
}

impl OrderOrError {
	pub fn from_result(result: Result<Order, TransitionError>) -> Self {
		match result {
			Ok(order) => OrderOrError::Order(OrderSummary::from(&order)),
			Err(error) => OrderOrError::Error(error),
		}
	}
}

/// Response body shared by all mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationResponse {
	#[serde(rename = "orderOrError")]
	pub order_or_error: OrderOrError,
}

impl From<OrderOrError> for MutationResponse {
	fn from(order_or_error: OrderOrError) -> Self {
		Self { order_or_error }
	}
}

/// Request for creating a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub seller: Party,
	pub buyer: Party,
}

/// Request for creating an offer on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOfferRequest {
	/// Side of the order the offer is made from.
	pub from: Side,
}

/// Response to an offer creation. `offerId` is absent when the offer was
/// refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOfferResponse {
	#[serde(rename = "offerId", default, skip_serializing_if = "Option::is_none")]
	pub offer_id: Option<String>,
	#[serde(rename = "orderOrError")]
	pub order_or_error: OrderOrError,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Transport-level API error with its HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Referenced resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = match self.status_code() {
			400 => StatusCode::BAD_REQUEST,
			404 => StatusCode::NOT_FOUND,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};

		(status, Json(self.to_error_response())).into_response()
	}
}
