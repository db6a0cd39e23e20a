//! Request handling for the exchange API.
//!
//! Handlers resolve the caller's [`Actor`] from headers set by the upstream
//! auth proxy, call the order service and map its outcome onto the response
//! envelope or a transport error.

pub mod offer;
pub mod order;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use exchange_core::OrderServiceError;
use exchange_types::{APIError, Actor, MutationResponse, Order, OrderOrError};

/// Header carrying the calling user's id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the comma separated partner ids the caller acts for.
pub const PARTNER_IDS_HEADER: &str = "x-partner-ids";

/// Builds the caller capability from request headers.
///
/// Missing headers yield an actor that can act for nobody.
pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
	let partner_ids = header(headers, PARTNER_IDS_HEADER)
		.map(|ids| {
			ids.split(',')
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.map(String::from)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	Actor::new(header(headers, USER_ID_HEADER).map(String::from), partner_ids)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}

/// Maps a failed order service call onto a transport error.
///
/// Business refusals never reach this function; they travel in the
/// response envelope.
pub fn api_error(err: OrderServiceError) -> APIError {
	match err {
		OrderServiceError::OfferNotFound(_) => APIError::NotFound {
			error_type: "OFFER_NOT_FOUND".into(),
			message: err.to_string(),
		},
		OrderServiceError::OrderNotFound(_) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: err.to_string(),
		},
		OrderServiceError::Transition(_) | OrderServiceError::Storage(_) => {
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".into(),
				message: err.to_string(),
			}
		},
	}
}

/// Turns a lifecycle mutation result into the envelope or a transport error.
pub fn mutation_response(
	result: Result<Order, OrderServiceError>,
) -> Result<MutationResponse, APIError> {
	match result {
		Ok(order) => Ok(OrderOrError::from_result(Ok(order)).into()),
		Err(OrderServiceError::Transition(error)) => Ok(OrderOrError::Error(error).into()),
		Err(e) => Err(api_error(e)),
	}
}

/// Maps a JSON body rejection onto a 400.
pub fn bad_request(rejection: JsonRejection) -> APIError {
	APIError::BadRequest {
		error_type: "INVALID_REQUEST".into(),
		message: rejection.body_text(),
	}
}
