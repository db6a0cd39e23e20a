//! Configuration module for the exchange.
//!
//! This module provides structures and utilities for managing exchange
//! configuration. It supports loading configuration from TOML files, resolves
//! `${VAR}` / `${VAR:-default}` environment references, and validates the
//! result before handing it out.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use exchange_types::OrderState;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this exchange instance.
	pub exchange: ExchangeConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// State timeouts and expiration runner settings.
	#[serde(default)]
	pub expiration: ExpirationConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the exchange instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// How long an order may stay in each timed state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpirationConfig {
	/// Hours a pending order waits for submission before it is abandoned.
	#[serde(default = "default_pending_hours")]
	pub pending_hours: u64,
	/// Hours a submitted order waits for the seller before it is rejected.
	#[serde(default = "default_submitted_hours")]
	pub submitted_hours: u64,
	/// Hours an approved order waits for fulfillment before it is rejected.
	#[serde(default = "default_approved_hours")]
	pub approved_hours: u64,
	/// Delay added to every expiration timer to absorb clock jitter.
	#[serde(default = "default_grace_seconds")]
	pub grace_seconds: u64,
	/// Maximum number of expiration jobs running at the same time.
	#[serde(default = "default_max_concurrent_jobs")]
	pub max_concurrent_jobs: usize,
}

impl Default for ExpirationConfig {
	fn default() -> Self {
		Self {
			pending_hours: default_pending_hours(),
			submitted_hours: default_submitted_hours(),
			approved_hours: default_approved_hours(),
			grace_seconds: default_grace_seconds(),
			max_concurrent_jobs: default_max_concurrent_jobs(),
		}
	}
}

impl ExpirationConfig {
	/// Returns how long an order may remain in `state`, or `None` when the
	/// state never times out.
	pub fn state_duration(&self, state: OrderState) -> Option<Duration> {
		let hours = match state {
			OrderState::Pending => self.pending_hours,
			OrderState::Submitted => self.submitted_hours,
			OrderState::Approved => self.approved_hours,
			OrderState::Fulfilled | OrderState::Rejected | OrderState::Abandoned => return None,
		};
		Some(Duration::from_secs(hours * 3600))
	}

	pub fn grace(&self) -> Duration {
		Duration::from_secs(self.grace_seconds)
	}
}

fn default_pending_hours() -> u64 {
	48
}

fn default_submitted_hours() -> u64 {
	48
}

fn default_approved_hours() -> u64 {
	168 // 7 days
}

fn default_grace_seconds() -> u64 {
	1
}

fn default_max_concurrent_jobs() -> usize {
	100
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_max_request_size() -> usize {
	64 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to keep the regex scan bounded
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.exchange.id.is_empty() {
			return Err(ConfigError::Validation("Exchange ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation required".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		let expiration = &self.expiration;
		for (name, hours) in [
			("pending_hours", expiration.pending_hours),
			("submitted_hours", expiration.submitted_hours),
			("approved_hours", expiration.approved_hours),
		] {
			if hours == 0 {
				return Err(ConfigError::Validation(format!(
					"expiration.{} must be greater than 0",
					name
				)));
			}
			if hours > 24 * 365 {
				return Err(ConfigError::Validation(format!(
					"expiration.{} cannot exceed 8760 (one year)",
					name
				)));
			}
		}
		if expiration.grace_seconds > 300 {
			return Err(ConfigError::Validation(
				"expiration.grace_seconds cannot exceed 300".into(),
			));
		}
		if expiration.max_concurrent_jobs == 0 {
			return Err(ConfigError::Validation(
				"expiration.max_concurrent_jobs must be at least 1".into(),
			));
		}

		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"API port must be set when the API is enabled".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[exchange]
id = "exchange-test"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("EXCHANGE_TEST_HOST", "localhost");
		std::env::set_var("EXCHANGE_TEST_PORT", "5432");

		let input = "host = \"${EXCHANGE_TEST_HOST}:${EXCHANGE_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("EXCHANGE_TEST_HOST");
		std::env::remove_var("EXCHANGE_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${EXCHANGE_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${EXCHANGE_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.unwrap_err().to_string().contains("EXCHANGE_MISSING_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.exchange.id, "exchange-test");
		assert_eq!(config.expiration.pending_hours, 48);
		assert_eq!(
			config.expiration.state_duration(OrderState::Approved),
			Some(Duration::from_secs(168 * 3600))
		);
		assert_eq!(config.expiration.state_duration(OrderState::Rejected), None);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_primary_storage_must_exist() {
		let config_str = r#"
[exchange]
id = "exchange-test"

[storage]
primary = "file"
[storage.implementations.memory]
"#;
		let err = Config::from_str(config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary storage 'file' not found in implementations"));
	}

	#[test]
	fn test_zero_expiration_rejected() {
		let config_str = format!("{}\n[expiration]\nsubmitted_hours = 0\n", MINIMAL);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("expiration.submitted_hours"));
	}

	#[test]
	fn test_api_section() {
		let config_str = format!("{}\n[api]\nenabled = true\nport = 8080\n", MINIMAL);
		let config = Config::from_str(&config_str).unwrap();
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.port, 8080);
		assert_eq!(api.host, "127.0.0.1");
	}
}
