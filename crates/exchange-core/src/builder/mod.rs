//! Builder pattern for constructing exchange engines.
//!
//! Storage backends are created from configuration through factory functions,
//! then the state machine, order service, scheduler and expiration job are
//! wired around the primary backend.

use crate::clock::{Clock, SystemClock};
use crate::engine::{event_bus::EventBus, ExchangeEngine};
use crate::expiration::{ExpirationScheduler, ExpireOrderJob, TimerScheduler};
use crate::service::OrderService;
use crate::state::OrderStateMachine;
use exchange_config::Config;
use exchange_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the event bus, per subscriber.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions needed to build an ExchangeEngine.
pub struct ExchangeFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing an ExchangeEngine with pluggable implementations.
pub struct ExchangeBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
}

impl ExchangeBuilder {
	/// Creates a new ExchangeBuilder using the system clock.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Builds the ExchangeEngine using the given factories.
	pub async fn build<SF>(
		self,
		factories: ExchangeFactories<SF>,
	) -> Result<ExchangeEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(component = "storage", implementation = %name, "No factory registered");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					storage_impls.insert(name.clone(), implementation);
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::MissingComponent(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let state_machine = Arc::new(OrderStateMachine::new(
			storage.clone(),
			self.clock.clone(),
			self.config.expiration.clone(),
		));

		let (timer_scheduler, expirations) =
			TimerScheduler::new(self.clock.clone(), self.config.expiration.grace());
		let scheduler: Arc<dyn ExpirationScheduler> = Arc::new(timer_scheduler);

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let order_service = Arc::new(OrderService::new(
			state_machine.clone(),
			scheduler.clone(),
			event_bus.clone(),
		));
		let expire_job = Arc::new(ExpireOrderJob::new(
			order_service.clone(),
			self.clock.clone(),
		));

		Ok(ExchangeEngine::new(
			self.config,
			state_machine,
			order_service,
			scheduler,
			expire_job,
			event_bus,
			expirations,
		))
	}
}
