//! Core order lifecycle engine for the exchange.
//!
//! This crate holds the lifecycle rules and their orchestration: the
//! transition validator, the order state machine persisting conditional
//! updates, the order service, delayed expiration callbacks, recovery of
//! those callbacks after a restart, and the engine and builder tying them
//! together.

pub mod builder;
pub mod clock;
pub mod engine;
pub mod expiration;
pub mod recovery;
pub mod service;
pub mod state;
pub mod validator;

pub use builder::{BuilderError, ExchangeBuilder, ExchangeFactories};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{event_bus::EventBus, EngineError, ExchangeEngine};
pub use expiration::{
	ExpirationError, ExpirationRequest, ExpirationScheduler, ExpireOrderJob, OrderLifecycle,
	TimerScheduler,
};
pub use recovery::{RecoveryReport, RecoveryService};
pub use service::{OrderService, OrderServiceError};
pub use state::{OrderStateError, OrderStateMachine};
pub use validator::TransitionValidator;
