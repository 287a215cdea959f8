//! Configuration loading and validation.
//!
//! The scanner is configured from a single JSON file. Every tunable has a
//! serde default so a minimal configuration only needs the chain identity
//! and the node RPC URL.

mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::utils::http::RetryConfig;

fn default_cron_schedule() -> String {
	// Every 10 seconds, the typical block cadence of the target chains
	"1/10 * * * * *".to_string()
}

fn default_confirmations() -> u64 {
	1
}

fn default_max_extracting() -> usize {
	20
}

fn default_fork_rollback_depth() -> u64 {
	2
}

fn default_data_dir() -> PathBuf {
	PathBuf::from("data")
}

/// Identity of a coin implemented by an on-chain contract.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CoinConfig {
	/// Contract address the coin lives at
	pub contract_address: String,

	/// Token ticker
	pub token: String,

	/// Decimal places of the smallest unit
	pub decimals: u8,
}

/// Configuration for one scanned chain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScannerConfig {
	/// Chain symbol, the key for all persisted state
	pub symbol: String,

	/// Human-readable chain name
	pub name: String,

	/// Node JSON-RPC endpoint
	pub rpc_url: String,

	/// Cron expression for how often to run the scan task
	#[serde(default = "default_cron_schedule")]
	pub cron_schedule: String,

	/// Safety margin below the chain tip that is never scanned
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,

	/// Maximum number of transactions being extracted simultaneously
	#[serde(default = "default_max_extracting")]
	pub max_extracting: usize,

	/// Number of heights to roll back when a fork is detected
	#[serde(default = "default_fork_rollback_depth")]
	pub fork_rollback_depth: u64,

	/// Number of heights below the tip to unconditionally re-scan
	#[serde(default)]
	pub rescan_last_block_count: u64,

	/// Whether to scan the mempool after reaching the tip
	#[serde(default)]
	pub scan_mempool: bool,

	/// The chain's native coin
	pub native_coin: CoinConfig,

	/// The chain's gas token
	pub gas_coin: CoinConfig,

	/// Address fee transfers are paid to, used to flag fee records
	#[serde(default)]
	pub fee_collection_address: Option<String>,

	/// Directory for checkpoint and block-cache files
	#[serde(default = "default_data_dir")]
	pub data_dir: PathBuf,

	/// Retry policy for node RPC requests
	#[serde(default)]
	pub retry_policy: RetryConfig,
}

impl ScannerConfig {
	/// Loads and validates a configuration from a JSON file.
	pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			ConfigError::file_error(
				format!("Failed to read config file: {}", path.display()),
				Some(Box::new(e)),
				None,
			)
		})?;

		let config: ScannerConfig = serde_json::from_str(&content).map_err(|e| {
			ConfigError::parse_error(
				format!("Failed to parse config file: {}", path.display()),
				Some(Box::new(e)),
				None,
			)
		})?;

		config.validate()?;
		Ok(config)
	}

	/// Validates the configuration.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.symbol.trim().is_empty() {
			return Err(ConfigError::validation_error(
				"Symbol must not be empty",
				None,
				None,
			));
		}

		if Url::parse(&self.rpc_url).is_err() {
			return Err(ConfigError::validation_error(
				format!("Invalid RPC URL: {}", self.rpc_url),
				None,
				None,
			));
		}

		if self.max_extracting == 0 {
			return Err(ConfigError::validation_error(
				"max_extracting must be at least 1",
				None,
				None,
			));
		}

		if self.fork_rollback_depth == 0 {
			return Err(ConfigError::validation_error(
				"fork_rollback_depth must be at least 1",
				None,
				None,
			));
		}

		Ok(())
	}
}
