//! HTTP server for the exchange API.
//!
//! Every route lives under `/api`. Mutations answer `200` with the
//! `orderOrError` envelope for business outcomes; transport errors use the
//! status codes of [`APIError`].

use axum::{
	extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
	http::{HeaderMap, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use exchange_config::ApiConfig;
use exchange_core::ExchangeEngine;
use exchange_types::{
	APIError, CreateOfferRequest, CreateOfferResponse, CreateOrderRequest, MutationResponse, Order,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::apis::{self, actor_from_headers, bad_request};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the exchange engine for processing requests.
	pub exchange: Arc<ExchangeEngine>,
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	exchange: Arc<ExchangeEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { exchange }, api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Exchange API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the `/api` router with its middleware.
pub fn router(state: AppState, max_request_size: usize) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_create_order))
				.route("/orders/{id}", get(handle_get_order_by_id))
				.route("/orders/{id}/offers", post(handle_create_offer))
				.route("/orders/{id}/submit", post(handle_submit_order))
				.route("/offers/{id}/accept", post(handle_accept_offer)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(state)
}

/// Handles POST /api/orders requests.
async fn handle_create_order(
	State(state): State<AppState>,
	body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let Json(request) = body.map_err(bad_request)?;
	let order = apis::order::create_order(request, state.exchange.order_service()).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order_by_id(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	let actor = actor_from_headers(&headers);
	match apis::order::get_order_by_id(&actor, &id, state.exchange.order_service()).await {
		Ok(order) => Ok(Json(order)),
		Err(e) => {
			tracing::warn!("Order retrieval failed: {}", e);
			Err(e)
		},
	}
}

/// Handles POST /api/orders/{id}/offers requests.
async fn handle_create_offer(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
	body: Result<Json<CreateOfferRequest>, JsonRejection>,
) -> Result<Json<CreateOfferResponse>, APIError> {
	let Json(request) = body.map_err(bad_request)?;
	let actor = actor_from_headers(&headers);
	apis::order::create_offer(&actor, &id, request, state.exchange.order_service())
		.await
		.map(Json)
}

/// Handles POST /api/orders/{id}/submit requests.
async fn handle_submit_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<MutationResponse>, APIError> {
	let actor = actor_from_headers(&headers);
	apis::order::submit_order(&actor, &id, state.exchange.order_service())
		.await
		.map(Json)
}

/// Handles POST /api/offers/{id}/accept requests.
async fn handle_accept_offer(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<MutationResponse>, APIError> {
	let actor = actor_from_headers(&headers);
	match apis::offer::accept_offer(&actor, &id, state.exchange.order_service()).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			tracing::warn!("Offer acceptance failed: {}", e);
			Err(e)
		},
	}
}
