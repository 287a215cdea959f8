//! Mock implementations shared by the integration tests.
//!
//! Provides:
//! - [`MockChainClient`] - mockall mock of the chain client trait
//! - [`MemoryCheckpointStore`] - in-memory checkpoint store recording its
//!   cursor write history
//! - [`CountingChainClient`] - instrumented client that tracks how many
//!   fetches are in flight simultaneously
//! - [`CollectingObserver`] - observer that records every event it receives

use async_trait::async_trait;
use mockall::mock;
use std::{
	collections::{HashMap, HashSet},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use wallet_scanner::{
	models::{
		Block, BlockHeader, ExtractedTxData, ScannerConfig, Transaction, Transfer, UnscanRecord,
	},
	repositories::{CheckpointStore, RepositoryError},
	services::{
		blockchain::{ChainClient, ChainClientError},
		notification::{NotificationError, ScanObserver},
	},
};

pub const NATIVE_CONTRACT: &str = "0100000000000000000000000000000000000000";
pub const GAS_CONTRACT: &str = "0200000000000000000000000000000000000000";

mock! {
	/// Mock implementation of the chain client trait.
	///
	/// Allows scripting node responses without network calls.
	pub ChainClient {}

	#[async_trait]
	impl ChainClient for ChainClient {
		async fn get_block_height(&self) -> Result<u64, ChainClientError>;
		async fn get_block_hash(&self, height: u64) -> Result<String, ChainClientError>;
		async fn get_block(&self, hash: &str) -> Result<Block, ChainClientError>;
		async fn get_block_by_height(&self, height: u64) -> Result<Block, ChainClientError>;
		async fn get_transaction(&self, tx_id: &str) -> Result<Transaction, ChainClientError>;
		async fn get_mempool_tx_ids(&self) -> Result<Vec<String>, ChainClientError>;
	}
}

/// A minimal scanner configuration for tests.
pub fn test_config() -> ScannerConfig {
	serde_json::from_value(serde_json::json!({
		"symbol": "ONT",
		"name": "ontology",
		"rpc_url": "http://localhost:20336",
		"native_coin": {
			"contract_address": NATIVE_CONTRACT,
			"token": "ONT",
			"decimals": 0
		},
		"gas_coin": {
			"contract_address": GAS_CONTRACT,
			"token": "ONG",
			"decimals": 9
		}
	}))
	.expect("test config must deserialize")
}

/// Builds a block whose hash is `h{height}` chained to `h{height - 1}`.
pub fn chained_block(height: u64, transactions: Vec<String>) -> Block {
	Block {
		height,
		hash: format!("h{}", height),
		prev_hash: format!("h{}", height - 1),
		transactions,
	}
}

#[derive(Default)]
struct MemoryState {
	cursor: HashMap<String, BlockHeader>,
	cursor_history: Vec<BlockHeader>,
	unscan: Vec<UnscanRecord>,
	blocks: HashMap<(String, u64), Block>,
}

/// In-memory checkpoint store.
///
/// Mirrors the file store's semantics and additionally records every
/// cursor write, so tests can assert the order the cursor moved in.
#[derive(Default, Clone)]
pub struct MemoryCheckpointStore {
	inner: Arc<Mutex<MemoryState>>,
}

impl MemoryCheckpointStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every cursor value ever saved, in write order.
	pub fn cursor_history(&self) -> Vec<BlockHeader> {
		self.inner.lock().unwrap().cursor_history.clone()
	}

	/// Seeds the cursor without recording history.
	pub fn seed_cursor(&self, header: BlockHeader) {
		self.inner
			.lock()
			.unwrap()
			.cursor
			.insert(header.symbol.clone(), header);
	}

	/// Seeds a cached block.
	pub fn seed_block(&self, symbol: &str, block: Block) {
		self.inner
			.lock()
			.unwrap()
			.blocks
			.insert((symbol.to_string(), block.height), block);
	}

	/// Seeds an unscanned record.
	pub fn seed_unscan_record(&self, record: UnscanRecord) {
		self.inner.lock().unwrap().unscan.push(record);
	}

	/// Snapshot of the unscanned records without going through the trait.
	pub fn get_unscan_records_sync(&self) -> Vec<UnscanRecord> {
		self.inner.lock().unwrap().unscan.clone()
	}
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
	async fn get_current_block_head(
		&self,
		symbol: &str,
	) -> Result<Option<BlockHeader>, RepositoryError> {
		Ok(self.inner.lock().unwrap().cursor.get(symbol).cloned())
	}

	async fn save_current_block_head(&self, header: &BlockHeader) -> Result<(), RepositoryError> {
		let mut state = self.inner.lock().unwrap();
		state.cursor.insert(header.symbol.clone(), header.clone());
		state.cursor_history.push(header.clone());
		Ok(())
	}

	async fn get_unscan_records(&self, symbol: &str) -> Result<Vec<UnscanRecord>, RepositoryError> {
		Ok(self
			.inner
			.lock()
			.unwrap()
			.unscan
			.iter()
			.filter(|r| r.symbol == symbol)
			.cloned()
			.collect())
	}

	async fn save_unscan_record(&self, record: &UnscanRecord) -> Result<(), RepositoryError> {
		let mut state = self.inner.lock().unwrap();
		if let Some(existing) = state.unscan.iter_mut().find(|r| {
			r.symbol == record.symbol
				&& r.block_height == record.block_height
				&& r.tx_id == record.tx_id
		}) {
			existing.reason = record.reason.clone();
		} else {
			state.unscan.push(record.clone());
		}
		Ok(())
	}

	async fn delete_unscan_record_by_id(
		&self,
		id: &str,
		symbol: &str,
	) -> Result<(), RepositoryError> {
		self.inner
			.lock()
			.unwrap()
			.unscan
			.retain(|r| !(r.symbol == symbol && r.id == id));
		Ok(())
	}

	async fn delete_unscan_records_by_height(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<(), RepositoryError> {
		self.inner
			.lock()
			.unwrap()
			.unscan
			.retain(|r| !(r.symbol == symbol && r.block_height == height));
		Ok(())
	}

	async fn get_local_block(
		&self,
		height: u64,
		symbol: &str,
	) -> Result<Option<Block>, RepositoryError> {
		Ok(self
			.inner
			.lock()
			.unwrap()
			.blocks
			.get(&(symbol.to_string(), height))
			.cloned())
	}

	async fn save_local_block(&self, block: &Block, symbol: &str) -> Result<(), RepositoryError> {
		self.inner
			.lock()
			.unwrap()
			.blocks
			.insert((symbol.to_string(), block.height), block.clone());
		Ok(())
	}

	async fn delete_local_blocks(&self, symbol: &str) -> Result<(), RepositoryError> {
		self.inner
			.lock()
			.unwrap()
			.blocks
			.retain(|(s, _), _| s != symbol);
		Ok(())
	}
}

/// Chain client double that counts concurrent `get_transaction` entries.
///
/// Every fetched transaction carries one native-coin transfer from
/// `Aalice`, so a resolver tracking `Aalice` produces extract data.
pub struct CountingChainClient {
	/// Fetches currently in flight
	current: AtomicUsize,
	/// High-water mark of concurrent fetches
	max_seen: AtomicUsize,
	/// Simulated fetch latency
	delay: Duration,
	/// Transactions that fail with a transient error
	failing: HashSet<String>,
}

impl CountingChainClient {
	pub fn new(delay: Duration) -> Self {
		Self {
			current: AtomicUsize::new(0),
			max_seen: AtomicUsize::new(0),
			delay,
			failing: HashSet::new(),
		}
	}

	pub fn with_failing(mut self, tx_ids: &[&str]) -> Self {
		self.failing = tx_ids.iter().map(|s| s.to_string()).collect();
		self
	}

	pub fn max_concurrent(&self) -> usize {
		self.max_seen.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ChainClient for CountingChainClient {
	async fn get_block_height(&self) -> Result<u64, ChainClientError> {
		Ok(0)
	}

	async fn get_block_hash(&self, _height: u64) -> Result<String, ChainClientError> {
		Err(ChainClientError::request_error("not scripted", None, None))
	}

	async fn get_block(&self, _hash: &str) -> Result<Block, ChainClientError> {
		Err(ChainClientError::request_error("not scripted", None, None))
	}

	async fn get_block_by_height(&self, _height: u64) -> Result<Block, ChainClientError> {
		Err(ChainClientError::request_error("not scripted", None, None))
	}

	async fn get_transaction(&self, tx_id: &str) -> Result<Transaction, ChainClientError> {
		let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_seen.fetch_max(in_flight, Ordering::SeqCst);

		tokio::time::sleep(self.delay).await;
		self.current.fetch_sub(1, Ordering::SeqCst);

		if self.failing.contains(tx_id) {
			return Err(ChainClientError::request_error(
				format!("fetch of {} failed", tx_id),
				None,
				None,
			));
		}

		Ok(Transaction {
			tx_id: tx_id.to_string(),
			block_height: 0,
			block_hash: String::new(),
			transfers: vec![Transfer {
				from: "Aalice".to_string(),
				to: "Abob".to_string(),
				contract_address: NATIVE_CONTRACT.to_string(),
				amount: "1".to_string(),
				is_fee: false,
			}],
		})
	}

	async fn get_mempool_tx_ids(&self) -> Result<Vec<String>, ChainClientError> {
		Ok(Vec::new())
	}
}

/// Observer that records every event it receives.
#[derive(Default)]
pub struct CollectingObserver {
	pub new_blocks: Mutex<Vec<BlockHeader>>,
	pub forks: Mutex<Vec<BlockHeader>>,
	pub extracts: Mutex<Vec<(String, ExtractedTxData)>>,
}

impl CollectingObserver {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn new_block_heights(&self) -> Vec<u64> {
		self.new_blocks.lock().unwrap().iter().map(|h| h.height).collect()
	}

	pub fn fork_headers(&self) -> Vec<BlockHeader> {
		self.forks.lock().unwrap().clone()
	}

	pub fn extract_count(&self) -> usize {
		self.extracts.lock().unwrap().len()
	}
}

#[async_trait]
impl ScanObserver for CollectingObserver {
	async fn on_new_block(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		self.new_blocks.lock().unwrap().push(header.clone());
		Ok(())
	}

	async fn on_fork(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		self.forks.lock().unwrap().push(header.clone());
		Ok(())
	}

	async fn on_extract_data(
		&self,
		source_key: &str,
		data: &ExtractedTxData,
	) -> Result<(), NotificationError> {
		self.extracts
			.lock()
			.unwrap()
			.push((source_key.to_string(), data.clone()));
		Ok(())
	}
}
