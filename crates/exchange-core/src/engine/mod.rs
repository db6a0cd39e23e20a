//! Exchange engine that runs expiration callbacks and watches lifecycle events.
//!
//! The engine owns the receiving end of the expiration channel. Due callbacks
//! are run as [`ExpireOrderJob`]s on a bounded number of concurrent tasks.

pub mod event_bus;
pub mod lifecycle;

use crate::expiration::{ExpirationRequest, ExpirationScheduler, ExpireOrderJob};
use crate::service::OrderService;
use crate::state::OrderStateMachine;
use exchange_config::Config;
use exchange_types::{truncate_id, ExchangeEvent, ExpirationEvent, OrderEvent};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// Main exchange engine.
#[derive(Clone)]
pub struct ExchangeEngine {
	/// Exchange configuration.
	pub(crate) config: Config,
	/// Order state machine
	pub(crate) state_machine: Arc<OrderStateMachine>,
	/// Order service for lifecycle operations.
	pub(crate) order_service: Arc<OrderService>,
	/// Scheduler used for recovery.
	pub(crate) scheduler: Arc<dyn ExpirationScheduler>,
	/// Job run for every due expiration.
	pub(crate) expire_job: Arc<ExpireOrderJob>,
	/// Event bus for inter-service communication.
	pub(crate) event_bus: event_bus::EventBus,
	/// Due expirations; taken by the first call to `run`.
	expirations: Arc<Mutex<Option<mpsc::UnboundedReceiver<ExpirationRequest>>>>,
}

impl ExchangeEngine {
	pub fn new(
		config: Config,
		state_machine: Arc<OrderStateMachine>,
		order_service: Arc<OrderService>,
		scheduler: Arc<dyn ExpirationScheduler>,
		expire_job: Arc<ExpireOrderJob>,
		event_bus: event_bus::EventBus,
		expirations: mpsc::UnboundedReceiver<ExpirationRequest>,
	) -> Self {
		Self {
			config,
			state_machine,
			order_service,
			scheduler,
			expire_job,
			event_bus,
			expirations: Arc::new(Mutex::new(Some(expirations))),
		}
	}

	/// Runs until ctrl-c is received.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
				std::future::pending::<()>().await;
			}
		})
		.await
	}

	/// Main execution loop; returns once `shutdown` completes.
	pub async fn run_until<S>(&self, shutdown: S) -> Result<(), EngineError>
	where
		S: Future<Output = ()>,
	{
		let mut expirations = self
			.expirations
			.lock()
			.await
			.take()
			.ok_or_else(|| EngineError::Service("Engine is already running".into()))?;

		self.initialize().await?;

		let mut event_receiver = self.event_bus.subscribe();
		let semaphore = Arc::new(Semaphore::new(self.config.expiration.max_concurrent_jobs));
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				// Run due expiration callbacks
				Some(request) = expirations.recv() => {
					self.spawn_handler(&semaphore, move |engine| async move {
						let ExpirationRequest { order_id, expected_state, .. } = request;
						let result = engine.expire_job.perform(&order_id, expected_state).await;
						engine.event_bus
							.publish(ExchangeEvent::Expiration(ExpirationEvent::Processed {
								order_id: order_id.clone(),
								expected_state,
							}))
							.ok();
						result.map_err(|e| EngineError::Handler(format!(
							"Failed to expire order {}: {}", truncate_id(&order_id), e
						)))
					});
				}

				// Audit trail of lifecycle events
				event = event_receiver.recv() => {
					match event {
						Ok(ExchangeEvent::Order(OrderEvent::StateChanged { order_id, from, to, .. })) => {
							tracing::debug!(order_id = %truncate_id(&order_id), %from, %to, "Observed state change");
						}
						Ok(_) => {}
						Err(broadcast::error::RecvError::Lagged(skipped)) => {
							tracing::warn!("Event receiver lagged, skipped {} events", skipped);
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}

				// Shutdown signal
				_ = &mut shutdown => {
					break;
				}
			}
		}

		self.shutdown().await
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the order service.
	pub fn order_service(&self) -> &Arc<OrderService> {
		&self.order_service
	}

	/// Spawns a handler task that runs once a concurrency permit is available.
	///
	/// Returns immediately, so a saturated limit never stalls the loop.
	/// Handler errors are logged, never propagated into the loop.
	fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(ExchangeEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
	{
		let engine = self.clone();
		let semaphore = semaphore.clone();
		tokio::spawn(async move {
			let _permit = match semaphore.acquire_owned().await {
				Ok(permit) => permit,
				Err(e) => {
					tracing::error!("Failed to acquire semaphore permit: {}", e);
					return;
				},
			};
			if let Err(e) = handler(engine).await {
				tracing::error!("Handler error: {}", e);
			}
		});
	}
}
