//! Order endpoints: creation, lookup, offers and submission.

use exchange_core::{OrderService, OrderServiceError};
use exchange_types::{
	truncate_id, APIError, Actor, CreateOfferRequest, CreateOfferResponse, CreateOrderRequest,
	MutationResponse, Order, OrderOrError,
};
use tracing::{info, warn};

use super::{api_error, mutation_response};

/// Creates a pending order between the requested parties.
///
/// Parties the lifecycle cannot tell apart are malformed input.
pub async fn create_order(
	request: CreateOrderRequest,
	service: &OrderService,
) -> Result<Order, APIError> {
	let order = match service.create_order(request.seller, request.buyer).await {
		Ok(order) => order,
		Err(OrderServiceError::Transition(error)) => {
			return Err(APIError::BadRequest {
				error_type: error.code.as_str().to_uppercase(),
				message: error.to_string(),
			});
		},
		Err(e) => return Err(api_error(e)),
	};
	info!(order_id = %truncate_id(&order.id), "Order created via API");
	Ok(order)
}

/// Returns the order if the caller is one of its parties.
///
/// Orders the caller may not see are reported exactly like missing ones.
pub async fn get_order_by_id(
	actor: &Actor,
	order_id: &str,
	service: &OrderService,
) -> Result<Order, APIError> {
	let order = service.get_order(order_id).await.map_err(api_error)?;
	if !actor.can_act_as_seller(&order) && !actor.can_act_as_buyer(&order) {
		warn!(order_id = %truncate_id(order_id), "Order lookup by non-party");
		return Err(api_error(OrderServiceError::OrderNotFound(
			order_id.to_string(),
		)));
	}
	Ok(order)
}

/// Creates an offer from the requested side and makes it the last offer.
pub async fn create_offer(
	actor: &Actor,
	order_id: &str,
	request: CreateOfferRequest,
	service: &OrderService,
) -> Result<CreateOfferResponse, APIError> {
	match service.create_offer(actor, order_id, request.from).await {
		Ok((offer, order)) => Ok(CreateOfferResponse {
			offer_id: Some(offer.id),
			order_or_error: OrderOrError::from_result(Ok(order)),
		}),
		Err(OrderServiceError::Transition(error)) => Ok(CreateOfferResponse {
			offer_id: None,
			order_or_error: OrderOrError::Error(error),
		}),
		Err(e) => Err(api_error(e)),
	}
}

/// Buyer submits the order.
pub async fn submit_order(
	actor: &Actor,
	order_id: &str,
	service: &OrderService,
) -> Result<MutationResponse, APIError> {
	mutation_response(service.submit(actor, order_id).await)
}
