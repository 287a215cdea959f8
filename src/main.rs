//! Wallet scanning service entry point.
//!
//! This binary provides the main entry point for the wallet block scanning
//! service. It loads the chain configuration and the tracked address book,
//! wires the scanner services together, and runs periodic scan tasks until
//! interrupted.
//!
//! # Flow
//! 1. Loads the scanner configuration from a JSON file
//! 2. Loads the tracked addresses, if an address book file exists
//! 3. Initializes the chain client, checkpoint store and event publisher
//! 4. Optionally resets the scan cursor for an operator-requested rescan
//! 5. Scans on the configured cron schedule and handles graceful shutdown
//!    on Ctrl+C

pub mod bootstrap;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use crate::{
	bootstrap::{initialize_scanner, Result},
	models::ScannerConfig,
	services::{
		notification::{EventKind, TracingScanObserver},
		scanner::InMemoryAddressBook,
	},
	utils::{logging::setup_logging, parse_string_to_bytes_size},
};

use clap::Parser;
use dotenvy::dotenv_override;
use std::env::{set_var, var};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
	name = "wallet-scanner",
	about = "A wallet block scanning service that follows a chain, extracts transfers for tracked addresses and notifies registered consumers.",
	version
)]
struct Cli {
	/// Path to the scanner configuration file
	#[arg(long, value_name = "PATH", default_value = "config/scanner.json")]
	config: PathBuf,

	/// Path to the tracked address book (JSON map of address to account key)
	#[arg(long, value_name = "PATH")]
	addresses: Option<PathBuf>,

	/// Reset the scan cursor and rescan from this block height
	#[arg(long, value_name = "HEIGHT")]
	rescan_from: Option<u64>,

	/// Validate configuration files without starting the service
	#[arg(long)]
	check: bool,

	/// Write logs to file instead of stdout
	#[arg(long)]
	log_file: bool,

	/// Set log level (trace, debug, info, warn, error)
	#[arg(long, value_name = "LEVEL")]
	log_level: Option<String>,

	/// Path to store log files (default: logs/)
	#[arg(long, value_name = "PATH")]
	log_path: Option<String>,

	/// Maximum log file size before rolling (e.g., "1GB", "500MB", "1024KB")
	#[arg(long, value_name = "SIZE", value_parser = parse_string_to_bytes_size)]
	log_max_size: Option<u64>,
}

impl Cli {
	/// Apply CLI options to environment variables, overriding any existing values
	fn apply_to_env(&self) {
		// Reload environment variables from .env file
		dotenv_override().ok();

		if self.log_file {
			set_var("LOG_MODE", "file");
		}

		if let Ok(level) = var("RUST_LOG") {
			set_var("LOG_LEVEL", level);
		}

		if let Some(level) = &self.log_level {
			set_var("LOG_LEVEL", level);
			set_var("RUST_LOG", level);
		}

		if let Some(path) = &self.log_path {
			set_var("LOG_DATA_DIR", path);
		}

		if let Some(max_size) = &self.log_max_size {
			set_var("LOG_MAX_SIZE", max_size.to_string());
		}
	}
}

/// Main entry point for the wallet scanning service.
///
/// # Errors
/// Returns an error if service initialization fails or if there's an error during shutdown.
#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	cli.apply_to_env();

	setup_logging().unwrap_or_else(|e| {
		error!("Failed to setup logging: {}", e);
	});

	let config = ScannerConfig::load_from_path(&cli.config)
		.map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

	// Validation-only mode
	if cli.check {
		info!(symbol = %config.symbol, "configuration is valid");
		return Ok(());
	}

	let address_book = match &cli.addresses {
		Some(path) => InMemoryAddressBook::load_from_path(&config.symbol, path)
			.map_err(|e| anyhow::anyhow!("Failed to load address book: {}", e))?,
		None => InMemoryAddressBook::new(&config.symbol),
	};

	if address_book.is_empty() {
		info!("no tracked addresses loaded, scanning will extract nothing");
	} else {
		info!(addresses = address_book.len(), "loaded tracked addresses");
	}

	let mut context = initialize_scanner(config, Arc::new(address_book)).await?;

	// Default consumer so scan activity is visible in the logs
	context
		.publisher
		.subscribe(&EventKind::ALL, Arc::new(TracingScanObserver))
		.await;

	if let Some(height) = cli.rescan_from {
		context
			.runner
			.scanner()
			.set_rescan_block_height(height)
			.await
			.map_err(|e| anyhow::anyhow!("Failed to reset scan cursor: {}", e))?;
	}

	context.runner.start().await?;

	info!("Service started, press Ctrl+C to shutdown");

	tokio::signal::ctrl_c().await?;

	info!("Shutting down");
	context.runner.stop().await?;

	Ok(())
}
