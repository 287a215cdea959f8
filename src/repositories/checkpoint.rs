//! Checkpoint storage for scan progress.
//!
//! This module provides the storage interface the scan loop persists its
//! state through, and a file-based implementation. Three kinds of state are
//! stored per chain symbol:
//! - the scan cursor (height and hash of the last fully-scanned block)
//! - unscanned records for failed heights/transactions awaiting retry
//! - a local block cache used to recover from forks without re-fetching

use async_trait::async_trait;
use glob::glob;
use std::path::PathBuf;

use crate::{
	models::{Block, BlockHeader, UnscanRecord},
	repositories::error::RepositoryError,
};

/// Interface for checkpoint storage implementations.
///
/// The scan loop is the only writer of the cursor and the unscanned-record
/// set; implementations do not need to coordinate concurrent writers.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
	/// Retrieves the persisted scan cursor for a chain, or `None` on a cold
	/// start.
	async fn get_current_block_head(
		&self,
		symbol: &str,
	) -> Result<Option<BlockHeader>, RepositoryError>;

	/// Persists the scan cursor.
	async fn save_current_block_head(&self, header: &BlockHeader) -> Result<(), RepositoryError>;

	/// Retrieves all unscanned records for a chain.
	async fn get_unscan_records(&self, symbol: &str) -> Result<Vec<UnscanRecord>, RepositoryError>;

	/// Persists an unscanned record. Saving a record for a height and
	/// transaction that already has one is a no-op.
	async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), RepositoryError>;

	/// Deletes one unscanned record by id.
	async fn delete_unscan_record_by_id(
		&self,
		id: &str,
		symbol: &str,
	) -> Result<(), RepositoryError>;

	/// Deletes every unscanned record at the given height.
	async fn delete_unscan_records_by_height(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<(), RepositoryError>;

	/// Retrieves a cached block by height.
	async fn get_local_block(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<Option<Block>, RepositoryError>;

	/// Caches a block body.
	async fn save_local_block(&self, block: &Block, symbol: &str) -> Result<(), RepositoryError>;

	/// Deletes every cached block for a chain.
	async fn delete_local_blocks(&self, symbol: &str) -> Result<(), RepositoryError>;
}

/// File-based implementation of checkpoint storage.
///
/// Stores each concern in its own JSON file under a configured directory:
/// `{symbol}_cursor.json`, `{symbol}_unscan.json` and
/// `{symbol}_block_{height}.json`.
#[derive(Clone)]
pub struct FileCheckpointStore {
	/// Base path for all storage files
	storage_path: PathBuf,
}

impl FileCheckpointStore {
	/// Creates a new file-based checkpoint store rooted at the given path.
	pub fn new(storage_path: PathBuf) -> Self {
		FileCheckpointStore { storage_path }
	}

	fn cursor_path(&self, symbol: &str) -> PathBuf {
		self.storage_path.join(format!("{}_cursor.json", symbol))
	}

	fn unscan_path(&self, symbol: &str) -> PathBuf {
		self.storage_path.join(format!("{}_unscan.json", symbol))
	}

	fn block_path(&self, symbol: &str, height: u64) -> PathBuf {
		self.storage_path
			.join(format!("{}_block_{}.json", symbol, height))
	}

	async fn read_unscan_records(&self, symbol: &str) -> Result<Vec<UnscanRecord>, RepositoryError> {
		let path = self.unscan_path(symbol);
		if !path.exists() {
			return Ok(Vec::new());
		}

		let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
			RepositoryError::storage_error(
				"Failed to read unscanned records",
				Some(Box::new(e)),
				None,
			)
		})?;

		serde_json::from_str(&content).map_err(|e| {
			RepositoryError::parse_error(
				"Failed to parse unscanned records",
				Some(Box::new(e)),
				None,
			)
		})
	}

	async fn write_unscan_records(
		&self,
		symbol: &str,
		records: &[UnscanRecord],
	) -> Result<(), RepositoryError> {
		let json = serde_json::to_string(records).map_err(|e| {
			RepositoryError::parse_error(
				"Failed to serialize unscanned records",
				Some(Box::new(e)),
				None,
			)
		})?;

		tokio::fs::write(self.unscan_path(symbol), json)
			.await
			.map_err(|e| {
				RepositoryError::storage_error(
					"Failed to save unscanned records",
					Some(Box::new(e)),
					None,
				)
			})
	}
}

impl Default for FileCheckpointStore {
	/// Initializes storage with the default path "data"
	fn default() -> Self {
		FileCheckpointStore::new(PathBuf::from("data"))
	}
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
	async fn get_current_block_head(
		&self,
		symbol: &str,
	) -> Result<Option<BlockHeader>, RepositoryError> {
		let path = self.cursor_path(symbol);
		if !path.exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
			RepositoryError::storage_error("Failed to read scan cursor", Some(Box::new(e)), None)
		})?;

		let header = serde_json::from_str(&content).map_err(|e| {
			RepositoryError::parse_error("Failed to parse scan cursor", Some(Box::new(e)), None)
		})?;

		Ok(Some(header))
	}

	async fn save_current_block_head(&self, header: &BlockHeader) -> Result<(), RepositoryError> {
		let json = serde_json::to_string(header).map_err(|e| {
			RepositoryError::parse_error(
				"Failed to serialize scan cursor",
				Some(Box::new(e)),
				None,
			)
		})?;

		tokio::fs::write(self.cursor_path(&header.symbol), json)
			.await
			.map_err(|e| {
				RepositoryError::storage_error(
					"Failed to save scan cursor",
					Some(Box::new(e)),
					None,
				)
			})
	}

	async fn get_unscan_records(&self, symbol: &str) -> Result<Vec<UnscanRecord>, RepositoryError> {
		self.read_unscan_records(symbol).await
	}

	async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), RepositoryError> {
		let mut records = self.read_unscan_records(&record.symbol).await?;

		// One record per (height, transaction) pair; a repeated failure
		// refreshes the recorded reason so the terminal not-found class is
		// recognized on the next purge
		if let Some(existing) = records
			.iter_mut()
			.find(|r| r.block_height == record.block_height && r.tx_id == record.tx_id)
		{
			existing.reason = record.reason.clone();
		} else {
			records.push(record.clone());
		}

		self.write_unscan_records(&record.symbol, &records).await
	}

	async fn delete_unscan_record_by_id(
		&self,
		id: &str,
		symbol: &str,
	) -> Result<(), RepositoryError> {
		let mut records = self.read_unscan_records(symbol).await?;
		records.retain(|r| r.id != id);
		self.write_unscan_records(symbol, &records).await
	}

	async fn delete_unscan_records_by_height(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<(), RepositoryError> {
		let mut records = self.read_unscan_records(symbol).await?;
		records.retain(|r| r.block_height != height);
		self.write_unscan_records(symbol, &records).await
	}

	async fn get_local_block(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<Option<Block>, RepositoryError> {
		let path = self.block_path(symbol, height);
		if !path.exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
			RepositoryError::storage_error("Failed to read cached block", Some(Box::new(e)), None)
		})?;

		let block = serde_json::from_str(&content).map_err(|e| {
			RepositoryError::parse_error("Failed to parse cached block", Some(Box::new(e)), None)
		})?;

		Ok(Some(block))
	}

	async fn save_local_block(&self, block: &Block, symbol: &str) -> Result<(), RepositoryError> {
		let json = serde_json::to_string(block).map_err(|e| {
			RepositoryError::parse_error(
				"Failed to serialize cached block",
				Some(Box::new(e)),
				None,
			)
		})?;

		tokio::fs::write(self.block_path(symbol, block.height), json)
			.await
			.map_err(|e| {
				RepositoryError::storage_error(
					"Failed to save cached block",
					Some(Box::new(e)),
					None,
				)
			})
	}

	async fn delete_local_blocks(&self, symbol: &str) -> Result<(), RepositoryError> {
		let pattern = self
			.storage_path
			.join(format!("{}_block_*.json", symbol))
			.to_string_lossy()
			.to_string();

		for entry in glob(&pattern)
			.map_err(|e| {
				RepositoryError::storage_error(
					"Failed to enumerate cached blocks",
					Some(Box::new(e)),
					None,
				)
			})?
			.flatten()
		{
			tokio::fs::remove_file(entry).await.map_err(|e| {
				RepositoryError::storage_error(
					"Failed to delete cached block",
					Some(Box::new(e)),
					None,
				)
			})?;
		}
		Ok(())
	}
}
