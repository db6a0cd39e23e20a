//! Offer endpoints.

use exchange_core::OrderService;
use exchange_types::{truncate_id, APIError, Actor, MutationResponse, OrderOrError};
use tracing::info;

use super::mutation_response;

/// Seller accepts an offer, approving its order.
///
/// Refusals are answered with the error envelope; only an offer id that
/// resolves to nothing is a transport error.
pub async fn accept_offer(
	actor: &Actor,
	offer_id: &str,
	service: &OrderService,
) -> Result<MutationResponse, APIError> {
	let response = mutation_response(service.accept_offer(actor, offer_id).await)?;
	if let OrderOrError::Error(error) = &response.order_or_error {
		info!(offer_id = %truncate_id(offer_id), code = %error.code, "Offer acceptance refused");
	}
	Ok(response)
}
