//! Common types for the exchange order lifecycle.
//!
//! This crate defines the data types shared by every exchange component:
//! the order and offer entities, the caller capability, typed transition
//! errors, events, API envelopes and storage namespaces.

/// Caller capability passed into validation.
pub mod actor;
/// API request, response and error envelope types.
pub mod api;
/// Event types for inter-service communication.
pub mod events;
/// Offer entity.
pub mod offer;
/// Order entity, lifecycle states and parties.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Typed business errors for rejected transitions.
pub mod transition;
/// Utility functions for common formatting.
pub mod utils;
/// Configuration validation types for pluggable implementations.
pub mod validation;

pub use actor::*;
pub use api::*;
pub use events::*;
pub use offer::*;
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use transition::*;
pub use utils::truncate_id;
pub use validation::*;
