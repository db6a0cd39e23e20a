//! Utility functions shared across the exchange crates.

pub mod formatting;

pub use formatting::truncate_id;
