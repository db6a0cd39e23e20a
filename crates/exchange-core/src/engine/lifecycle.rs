//! Lifecycle management for the exchange engine.
//!
//! Startup re-arms expiration callbacks lost with the previous process.

use super::{EngineError, ExchangeEngine};
use crate::recovery::RecoveryService;

impl ExchangeEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(exchange_id = %self.config.exchange.id, "Initializing exchange engine");

		let recovery = RecoveryService::new(self.state_machine.clone(), self.scheduler.clone());
		let report = recovery
			.recover_state()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		if report.failed > 0 {
			tracing::warn!(
				"{} orders could not be rescheduled and will not expire until the next restart",
				report.failed
			);
		}
		Ok(())
	}

	/// Performs cleanup operations
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down exchange engine");
		Ok(())
	}
}
