//! Storage module for the exchange.
//!
//! This module provides the record store behind orders and offers. Backends
//! only deal in raw bytes; [`StorageService`] layers typed JSON access and the
//! conditional update on top of them.

use async_trait::async_trait;
use exchange_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Number of read-validate-swap rounds before a conditional update gives up.
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A conditional update kept losing races against concurrent writers.
	#[error("Conflicting concurrent updates for {0}")]
	Conflict(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Besides plain key-value access, a backend must provide an atomic
/// compare-and-swap. The lifecycle relies on it instead of in-process locks,
/// so it has to hold across every process sharing the backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, creating or overwriting the key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Replaces the value only if it still equals `expected`.
	///
	/// Returns `Ok(false)` when the stored value differs and
	/// `Err(StorageError::NotFound)` when the key does not exist.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Lists the ids stored under a namespace.
	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id` keys.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves every value stored under a namespace as `(id, value)` pairs.
	///
	/// Entries that disappear between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let ids = self.backend.list_ids(namespace).await?;
		let mut values = Vec::with_capacity(ids.len());
		for id in ids {
			match self.retrieve(namespace, &id).await {
				Ok(value) => values.push((id, value)),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}


	/// Conditionally updates an existing value.
	///
	/// Reads the current value, hands it to `mutate`, and writes the result
	/// only if the stored bytes are still the ones that were read. When
	/// another writer got there first the value is re-read and `mutate` runs
	/// again against it, so any precondition checked inside `mutate` holds at
	/// write time. An error from `mutate` aborts without writing anything.
	pub async fn update_with<T, E, F>(&self, namespace: &str, id: &str, mut mutate: F) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		F: FnMut(&mut T) -> Result<(), E>,
	{
		let key = Self::key(namespace, id);

		for attempt in 1..=MAX_UPDATE_ATTEMPTS {
			let current = self.backend.get_bytes(&key).await?;
			let mut value: T = serde_json::from_slice(&current)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;

			mutate(&mut value)?;

			let bytes = serde_json::to_vec(&value)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;
			if self.backend.compare_and_swap(&key, &current, bytes).await? {
				return Ok(value);
			}

			tracing::debug!(key = %key, attempt, "Conditional update raced, retrying");
		}

		Err(StorageError::Conflict(key).into())
	}
}
