//! Services orchestrating validated lifecycle changes.

pub mod order;

pub use order::{OrderService, OrderServiceError};
