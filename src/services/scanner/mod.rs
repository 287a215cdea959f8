//! Block scanning engine.
//!
//! This module contains the scan loop state machine, the
//! bounded-concurrency extraction pipeline, and the address-matching seam
//! the pipeline resolves tracked addresses through.

mod error;
mod extractor;
mod service;

pub use error::ScannerError;
pub use extractor::TransactionExtractor;
pub use service::{BlockScanner, JobSchedulerTrait, ScannerRunner, ScannerState};

use std::{
	collections::HashMap,
	path::Path,
	sync::{Mutex, PoisonError},
};

use crate::{models::SourceKey, utils::parsing::normalize_string};

/// Resolves whether an address belongs to a tracked account.
///
/// Implemented by the wallet layer; the scanner only asks "does this
/// address belong to a known account, and what logical account key does it
/// map to".
pub trait AddressResolver: Send + Sync {
	/// Returns the source key the address maps to, if it is tracked for
	/// the given chain symbol.
	fn resolve(&self, address: &str, symbol: &str) -> Option<SourceKey>;
}

/// Address book backed by an in-memory map.
///
/// The default resolver: addresses under scan are registered with the
/// account key they belong to, optionally loaded from a JSON file mapping
/// address to source key.
pub struct InMemoryAddressBook {
	symbol: String,
	addresses: Mutex<HashMap<String, SourceKey>>,
}

impl InMemoryAddressBook {
	/// Creates an empty address book for a chain.
	pub fn new(symbol: &str) -> Self {
		Self {
			symbol: symbol.to_string(),
			addresses: Mutex::new(HashMap::new()),
		}
	}

	/// Loads an address book from a JSON file of `address: source key`
	/// pairs.
	pub fn load_from_path(symbol: &str, path: &Path) -> Result<Self, ScannerError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			ScannerError::config_error(
				format!("Failed to read address book: {}", path.display()),
				Some(Box::new(e)),
				None,
			)
		})?;

		let addresses: HashMap<String, SourceKey> =
			serde_json::from_str(&content).map_err(|e| {
				ScannerError::config_error(
					format!("Failed to parse address book: {}", path.display()),
					Some(Box::new(e)),
					None,
				)
			})?;

		Ok(Self {
			symbol: symbol.to_string(),
			addresses: Mutex::new(addresses),
		})
	}

	/// Registers an address for scanning.
	pub fn insert(&self, address: &str, source_key: &str) {
		self.addresses
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(address.to_string(), source_key.to_string());
	}

	/// Removes an address from scanning.
	pub fn remove(&self, address: &str) {
		self.addresses
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(address);
	}

	/// Number of tracked addresses.
	pub fn len(&self) -> usize {
		self.addresses
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	/// Whether no addresses are tracked.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl AddressResolver for InMemoryAddressBook {
	fn resolve(&self, address: &str, symbol: &str) -> Option<SourceKey> {
		if normalize_string(symbol) != normalize_string(&self.symbol) {
			return None;
		}

		self.addresses
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(address)
			.cloned()
	}
}
