//! Main entry point for the exchange service.
//!
//! Runs the exchange engine, which executes expiration callbacks, and
//! optionally the HTTP API that maps caller requests onto the order service.

use clap::Parser;
use exchange_config::Config;
use exchange_core::{ExchangeBuilder, ExchangeEngine, ExchangeFactories};
use exchange_storage::StorageFactory;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the exchange service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "EXCHANGE_CONFIG", default_value = "config/exchange.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started exchange");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.exchange.id);

	let engine = Arc::new(build_exchange(config.clone()).await?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine_task => {
					tracing::info!("Exchange engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting exchange engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped exchange");
	Ok(())
}

/// Builds the exchange engine with every registered storage backend.
async fn build_exchange(config: Config) -> Result<ExchangeEngine, Box<dyn std::error::Error>> {
	let storage_factories: HashMap<String, StorageFactory> =
		exchange_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect();

	Ok(ExchangeBuilder::new(config)
		.build(ExchangeFactories { storage_factories })
		.await?)
}
