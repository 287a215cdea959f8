//! Core chain client interface.
//!
//! This module defines the read-only surface the scanning engine consumes
//! from a chain node. Implementations are pure request/response and hold no
//! scanning state.

use async_trait::async_trait;

use crate::{
	models::{Block, Transaction},
	services::blockchain::error::ChainClientError,
};

/// Defines the node operations the scanner depends on.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Retrieves the current chain tip height.
	async fn get_block_height(&self) -> Result<u64, ChainClientError>;

	/// Retrieves the hash of the block at the given height.
	async fn get_block_hash(&self, height: u64) -> Result<String, ChainClientError>;

	/// Retrieves a block by hash.
	async fn get_block(&self, hash: &str) -> Result<Block, ChainClientError>;

	/// Retrieves a block by height.
	async fn get_block_by_height(&self, height: u64) -> Result<Block, ChainClientError>;

	/// Retrieves a transaction with its decoded transfer events.
	///
	/// Returns [`ChainClientError::TransactionNotFound`] when the node
	/// reports the transaction does not exist.
	async fn get_transaction(&self, tx_id: &str) -> Result<Transaction, ChainClientError>;

	/// Retrieves the transaction ids currently in the mempool.
	async fn get_mempool_tx_ids(&self) -> Result<Vec<String>, ChainClientError>;
}
