//! Bootstrap module for wiring the scanner together.
//!
//! Constructs the chain client, checkpoint store and event publisher from
//! a validated configuration and assembles them into a runnable scanner.
//! The service context is built explicitly here and passed by reference;
//! there is no ambient global state.

use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;

use crate::{
	models::ScannerConfig,
	repositories::FileCheckpointStore,
	services::{
		blockchain::HttpChainClient,
		notification::EventPublisher,
		scanner::{AddressResolver, BlockScanner, ScannerRunner},
	},
};

/// Result type used by the binary entry point.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Everything the binary needs to drive one scanned chain.
pub struct ScannerContext {
	/// The runner scheduling periodic scan tasks
	pub runner: ScannerRunner<HttpChainClient, FileCheckpointStore, JobScheduler>,
	/// The publisher observers register with
	pub publisher: Arc<EventPublisher>,
}

/// Builds the full service context for one chain.
///
/// # Arguments
/// * `config` - Validated scanner configuration
/// * `resolver` - Address-matching collaborator provided by the wallet layer
pub async fn initialize_scanner(
	config: ScannerConfig,
	resolver: Arc<dyn AddressResolver>,
) -> Result<ScannerContext> {
	std::fs::create_dir_all(&config.data_dir)?;

	let store = Arc::new(FileCheckpointStore::new(config.data_dir.clone()));

	let client = Arc::new(HttpChainClient::new(
		&config.rpc_url,
		config.fee_collection_address.clone(),
		&config.retry_policy,
	)?);

	let publisher = Arc::new(EventPublisher::new());

	let scanner = Arc::new(BlockScanner::new(
		config,
		client,
		store,
		resolver,
		publisher.clone(),
	)?);

	Ok(ScannerContext {
		runner: ScannerRunner::new(scanner),
		publisher,
	})
}
