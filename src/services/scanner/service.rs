//! Block scanner service implementation.
//!
//! Drives scanning for one chain: walks block heights forward from the
//! persisted cursor, detects chain reorganizations and rolls the cursor
//! back, runs the extraction pipeline over each block, and re-drives
//! previously failed heights. The scan task is designed to be invoked
//! periodically by a scheduler; one invocation scans up to the chain tip
//! (minus the confirmation margin) and returns.

use anyhow::Context;
use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, PoisonError,
	},
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::instrument;

use crate::{
	models::{Block, BlockHeader, BlockPosition, ScannerConfig, UnscanRecord},
	repositories::CheckpointStore,
	services::{
		blockchain::{ChainClient, TX_NOT_FOUND_PREFIX},
		notification::EventPublisher,
		scanner::{error::ScannerError, extractor::TransactionExtractor, AddressResolver},
	},
};

/// Trait for job scheduler
///
/// This trait is used to abstract the job scheduler implementation so the
/// scanner can be driven by different schedulers (and by tests).
#[async_trait::async_trait]
pub trait JobSchedulerTrait: Send + Sync + Sized {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>>;
	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Implementation of the job scheduler trait for the JobScheduler struct
#[async_trait::async_trait]
impl JobSchedulerTrait for JobScheduler {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
		Self::new().await.map_err(Into::into)
	}

	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.add(job).await.map(|_| ()).map_err(Into::into)
	}

	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.start().await.map(|_| ()).map_err(Into::into)
	}

	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.shutdown().await.map(|_| ()).map_err(Into::into)
	}
}

/// Lifecycle states of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
	/// Created, never started
	Idle,
	/// Scan tasks are running
	Scanning,
	/// Temporarily suspended, can be restarted
	Paused,
	/// Shut down
	Stopped,
}

/// Scanner for a single chain.
///
/// Owns the scan cursor and the unscanned-record set exclusively: the scan
/// task is the only writer, so no locking is needed beyond the extraction
/// pipeline's internal token pool.
pub struct BlockScanner<C, S> {
	client: Arc<C>,
	store: Arc<S>,
	publisher: Arc<EventPublisher>,
	extractor: TransactionExtractor<C, S>,
	config: ScannerConfig,
	scanning: AtomicBool,
	state: Mutex<ScannerState>,
}

impl<C, S> BlockScanner<C, S>
where
	C: ChainClient + Send + Sync + 'static,
	S: CheckpointStore + 'static,
{
	/// Creates a new scanner from its collaborators.
	///
	/// Fails when the configuration is invalid; all other collaborators are
	/// required by construction.
	pub fn new(
		config: ScannerConfig,
		client: Arc<C>,
		store: Arc<S>,
		resolver: Arc<dyn AddressResolver>,
		publisher: Arc<EventPublisher>,
	) -> Result<Self, ScannerError> {
		config.validate().map_err(|e| {
			ScannerError::config_error(
				"Invalid scanner configuration",
				Some(Box::new(e)),
				None,
			)
		})?;

		let extractor = TransactionExtractor::new(
			&config,
			client.clone(),
			store.clone(),
			resolver,
			publisher.clone(),
		);

		Ok(Self {
			client,
			store,
			publisher,
			extractor,
			config,
			scanning: AtomicBool::new(false),
			state: Mutex::new(ScannerState::Idle),
		})
	}

	/// Chain symbol this scanner is responsible for.
	pub fn symbol(&self) -> &str {
		&self.config.symbol
	}

	/// Cron expression the scan task should be scheduled on.
	pub fn cron_schedule(&self) -> &str {
		&self.config.cron_schedule
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ScannerState {
		*self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Whether scan tasks currently make progress.
	pub fn is_scanning(&self) -> bool {
		self.scanning.load(Ordering::SeqCst)
	}

	/// Marks the scanner as actively scanning.
	pub fn start_scanning(&self) {
		self.scanning.store(true, Ordering::SeqCst);
		*self.state.lock().unwrap_or_else(PoisonError::into_inner) = ScannerState::Scanning;
	}

	/// Suspends scanning. The flag is observed between height iterations;
	/// an in-flight block always runs to completion.
	pub fn pause(&self) {
		self.scanning.store(false, Ordering::SeqCst);
		*self.state.lock().unwrap_or_else(PoisonError::into_inner) = ScannerState::Paused;
	}

	/// Resumes scanning after a pause.
	pub fn restart(&self) {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		if *state == ScannerState::Paused {
			self.scanning.store(true, Ordering::SeqCst);
			*state = ScannerState::Scanning;
		}
	}

	/// Stops the scanner for good.
	pub fn stop(&self) {
		self.scanning.store(false, Ordering::SeqCst);
		*self.state.lock().unwrap_or_else(PoisonError::into_inner) = ScannerState::Stopped;
	}

	/// Resets the persisted cursor so scanning resumes from `height`.
	///
	/// Operator action for historical rescans. The cached blocks are
	/// dropped along with the cursor so fork recovery cannot pick up stale
	/// bodies from before the rescan point.
	pub async fn set_rescan_block_height(&self, height: u64) -> Result<(), ScannerError> {
		if height == 0 {
			return Err(ScannerError::config_error(
				"block height to rescan must be greater than 0",
				None,
				None,
			));
		}

		let target = height - 1;
		let block = self
			.client
			.get_block_by_height(target)
			.await
			.map_err(|e| {
				ScannerError::network_error(
					format!("Failed to fetch rescan target block {}", target),
					Some(Box::new(e)),
					None,
				)
			})?;

		self.store
			.save_current_block_head(&block.header(&self.config.symbol, false))
			.await
			.map_err(|e| {
				ScannerError::storage_error(
					"Failed to save rescan cursor",
					Some(Box::new(e)),
					None,
				)
			})?;

		if let Err(e) = self.store.delete_local_blocks(&self.config.symbol).await {
			tracing::warn!(error = %e, "failed to clear local block cache");
		}

		tracing::info!(height = target, "scan cursor reset");
		Ok(())
	}

	/// One scheduled scan invocation: walk from the cursor to the
	/// confirmed tip, then re-scan the tail, optionally sweep the mempool,
	/// and re-drive failed records.
	#[instrument(skip_all, fields(symbol = %self.config.symbol))]
	pub async fn scan_task(&self) -> Result<(), ScannerError> {
		let head = self.scanned_block_header().await?;
		let mut current_height = head.height;
		let mut current_hash = head.hash;

		loop {
			if !self.is_scanning() {
				// Suspended; end this invocation immediately
				return Ok(());
			}

			let max_height = match self.client.get_block_height().await {
				Ok(tip) => tip.saturating_sub(self.config.confirmations),
				Err(e) => {
					tracing::warn!(error = %e, "failed to read chain height");
					break;
				}
			};

			if current_height >= max_height {
				tracing::info!(
					height = max_height,
					"scanned up to the confirmed chain tip"
				);
				break;
			}

			current_height += 1;
			tracing::info!(height = current_height, "scanning height");

			let block = match self.fetch_block(current_height).await {
				Ok(block) => block,
				Err(e) => {
					// Fetch failures are retried later, not fatal
					tracing::warn!(
						height = current_height,
						error = %e,
						"failed to fetch block"
					);
					self.save_block_unscan_record(current_height, e.to_string())
						.await;
					continue;
				}
			};

			if current_hash != block.prev_hash {
				match self.handle_reorg(&block, &current_hash).await {
					Ok((height, hash)) => {
						current_height = height;
						current_hash = hash;
					}
					Err(e) => {
						tracing::error!(
							height = current_height,
							error = %e,
							"failed to recover from fork"
						);
						break;
					}
				}
			} else {
				self.process_block(&block).await;
				current_hash = block.hash.clone();
			}
		}

		// Re-scan the tail so late-arriving transactions near the tip are
		// picked up
		if self.config.rescan_last_block_count > 0 {
			let start = current_height
				.saturating_sub(self.config.rescan_last_block_count)
				.max(1);
			for height in start..current_height {
				if let Err(e) = self.scan_height(height).await {
					tracing::warn!(height, error = %e, "tail rescan failed");
				}
			}
		}

		if self.config.scan_mempool {
			self.scan_mempool().await;
		}

		if let Err(e) = self.rescan_failed_records().await {
			tracing::warn!(error = %e, "failed record rescan did not complete");
		}

		Ok(())
	}

	/// Scans a single height and notifies observers of the block.
	pub async fn scan_block(&self, height: u64) -> Result<(), ScannerError> {
		let block = self.scan_height(height).await?;

		if let Err(e) = self
			.publisher
			.notify_new_block(&block.header(&self.config.symbol, false))
			.await
		{
			tracing::warn!(height, error = %e, "new block notification failed");
		}

		Ok(())
	}

	/// Loads the scan cursor, initializing it near the chain tip on a cold
	/// start.
	async fn scanned_block_header(&self) -> Result<BlockHeader, ScannerError> {
		let stored = self
			.store
			.get_current_block_head(&self.config.symbol)
			.await
			.map_err(|e| {
				ScannerError::storage_error(
					"Failed to load scan cursor",
					Some(Box::new(e)),
					None,
				)
			})?;

		if let Some(header) = stored {
			if header.height > 0 {
				return Ok(header);
			}
		}

		// Cold start: begin two blocks below the tip, not at genesis.
		// Historical rescans are an explicit operator action.
		let tip = self.client.get_block_height().await.map_err(|e| {
			ScannerError::network_error(
				"Failed to read chain height",
				Some(Box::new(e)),
				None,
			)
		})?;

		let height = tip.saturating_sub(2).max(1);
		let block = self.client.get_block_by_height(height).await.map_err(|e| {
			ScannerError::network_error(
				format!("Failed to fetch initial block {}", height),
				Some(Box::new(e)),
				None,
			)
		})?;

		Ok(block.header(&self.config.symbol, false))
	}

	/// Fetches the block at a height via its hash.
	async fn fetch_block(&self, height: u64) -> Result<Block, ScannerError> {
		let hash = self.client.get_block_hash(height).await.map_err(|e| {
			ScannerError::network_error(
				format!("Failed to fetch hash of block {}", height),
				Some(Box::new(e)),
				None,
			)
		})?;

		self.client.get_block(&hash).await.map_err(|e| {
			ScannerError::network_error(
				format!("Failed to fetch block {}", height),
				Some(Box::new(e)),
				None,
			)
		})
	}

	/// Handles a detected chain reorganization.
	///
	/// Returns the rolled-back working cursor. The abandoned local block is
	/// announced with `fork = true` so observers can invalidate records
	/// attributed to it.
	async fn handle_reorg(
		&self,
		block: &Block,
		local_hash: &str,
	) -> Result<(u64, String), ScannerError> {
		let symbol = &self.config.symbol;
		let fork_height = block.height.saturating_sub(1);

		tracing::warn!(
			height = block.height,
			local_hash,
			mainnet_hash = %block.prev_hash,
			"chain fork detected"
		);

		// The locally stored block at the abandoned height, if any
		let fork_block = match self.store.get_local_block(fork_height, symbol).await {
			Ok(block) => block,
			Err(e) => {
				tracing::warn!(height = fork_height, error = %e, "failed to load local block");
				None
			}
		};

		// Records at the abandoned height belonged to the dead branch
		if let Err(e) = self
			.store
			.delete_unscan_records_by_height(fork_height, symbol)
			.await
		{
			tracing::warn!(
				height = fork_height,
				error = %e,
				"failed to delete unscanned records of abandoned branch"
			);
		}

		// Roll back with one extra height of safety margin against deeper
		// forks, never past height 1
		let rollback_to = block
			.height
			.saturating_sub(self.config.fork_rollback_depth)
			.max(1);

		let local_block = match self.store.get_local_block(rollback_to, symbol).await {
			Ok(Some(block)) => block,
			_ => self
				.client
				.get_block_by_height(rollback_to)
				.await
				.map_err(|e| {
					ScannerError::network_error(
						format!("Failed to fetch rollback block {}", rollback_to),
						Some(Box::new(e)),
						None,
					)
				})?,
		};

		self.store
			.save_current_block_head(&local_block.header(symbol, false))
			.await
			.map_err(|e| {
				ScannerError::storage_error(
					"Failed to save rolled-back cursor",
					Some(Box::new(e)),
					None,
				)
			})?;

		tracing::info!(
			height = local_block.height,
			hash = %local_block.hash,
			"rescanning from rolled-back height"
		);

		if let Some(fork_block) = fork_block {
			if let Err(e) = self
				.publisher
				.notify_fork(&fork_block.header(symbol, true))
				.await
			{
				tracing::warn!(height = fork_height, error = %e, "fork notification failed");
			}
		}

		Ok((local_block.height, local_block.hash))
	}

	/// Extracts one block, advances the cursor past it and notifies
	/// observers.
	async fn process_block(&self, block: &Block) {
		let symbol = &self.config.symbol;
		let position = BlockPosition::Confirmed {
			height: block.height,
			hash: block.hash.clone(),
		};

		if let Err(e) = self
			.extractor
			.batch_extract(&position, &block.transactions)
			.await
		{
			// The failed transactions are recorded for retry; the cursor
			// still advances (at-least-once delivery)
			tracing::warn!(
				height = block.height,
				error = %e,
				"block extraction finished with failures"
			);
		}

		let header = block.header(symbol, false);
		if let Err(e) = self.store.save_current_block_head(&header).await {
			tracing::error!(height = block.height, error = %e, "failed to save scan cursor");
		}

		if let Err(e) = self.store.save_local_block(block, symbol).await {
			tracing::warn!(height = block.height, error = %e, "failed to cache block");
		}

		if let Err(e) = self.publisher.notify_new_block(&header).await {
			tracing::warn!(height = block.height, error = %e, "new block notification failed");
		}
	}

	/// Fetches and extracts one height without advancing the cursor or
	/// notifying observers. Used by the tail rescan and the retry pass.
	async fn scan_height(&self, height: u64) -> Result<Block, ScannerError> {
		let hash = self.client.get_block_hash(height).await.map_err(|e| {
			ScannerError::network_error(
				format!("Failed to fetch hash of block {}", height),
				Some(Box::new(e)),
				None,
			)
		})?;

		let block = match self.client.get_block(&hash).await {
			Ok(block) => block,
			Err(e) => {
				self.save_block_unscan_record(height, e.to_string()).await;
				return Err(ScannerError::network_error(
					format!("Failed to fetch block {}", height),
					Some(Box::new(e)),
					None,
				));
			}
		};

		let position = BlockPosition::Confirmed {
			height: block.height,
			hash: block.hash.clone(),
		};
		if let Err(e) = self
			.extractor
			.batch_extract(&position, &block.transactions)
			.await
		{
			tracing::warn!(height, error = %e, "block extraction finished with failures");
		}

		Ok(block)
	}

	/// Sweeps the mempool through the extraction pipeline.
	async fn scan_mempool(&self) {
		tracing::info!("scanning mempool");

		let tx_ids = match self.client.get_mempool_tx_ids().await {
			Ok(tx_ids) => tx_ids,
			Err(e) => {
				tracing::warn!(error = %e, "failed to read mempool");
				return;
			}
		};

		if tx_ids.is_empty() {
			return;
		}

		if let Err(e) = self
			.extractor
			.batch_extract(&BlockPosition::Mempool, &tx_ids)
			.await
		{
			tracing::warn!(error = %e, "mempool extraction finished with failures");
		}
	}

	/// Re-drives extraction for all persisted unscanned records.
	///
	/// Heights without recorded transaction ids re-fetch the whole block to
	/// recover the transaction list. Heights that extract cleanly have
	/// their records deleted; permanently missing transactions are purged
	/// without retry.
	pub async fn rescan_failed_records(&self) -> Result<(), ScannerError> {
		let symbol = &self.config.symbol;
		let records = self.store.get_unscan_records(symbol).await.map_err(|e| {
			ScannerError::storage_error(
				"Failed to load unscanned records",
				Some(Box::new(e)),
				None,
			)
		})?;

		let mut groups: BTreeMap<u64, Vec<String>> = BTreeMap::new();
		for record in &records {
			let group = groups.entry(record.block_height).or_default();
			if let Some(tx_id) = &record.tx_id {
				group.push(tx_id.clone());
			}
		}

		for (height, tx_ids) in groups {
			tracing::info!(height, "rescanning failed height");

			let (hash, tx_ids) = if tx_ids.is_empty() {
				// Whole-block failure: recover the transaction list
				match self.client.get_block_by_height(height).await {
					Ok(block) => (block.hash.clone(), block.transactions),
					Err(e) => {
						tracing::warn!(height, error = %e, "failed to re-fetch block");
						continue;
					}
				}
			} else {
				match self.client.get_block_hash(height).await {
					Ok(hash) => (hash, tx_ids),
					Err(e) => {
						tracing::warn!(height, error = %e, "failed to re-fetch block hash");
						continue;
					}
				}
			};

			let position = BlockPosition::Confirmed { height, hash };
			if self.extractor.batch_extract(&position, &tx_ids).await.is_err() {
				// Still failing; the refreshed records stay for the next pass
				continue;
			}

			if let Err(e) = self
				.store
				.delete_unscan_records_by_height(height, symbol)
				.await
			{
				tracing::warn!(height, error = %e, "failed to delete unscanned records");
			}
		}

		self.purge_not_found_records().await;
		Ok(())
	}

	/// Drops records whose transactions the node reports as nonexistent.
	/// These are terminal failures; retrying them forever would pin the
	/// record set.
	async fn purge_not_found_records(&self) {
		let symbol = &self.config.symbol;
		let records = match self.store.get_unscan_records(symbol).await {
			Ok(records) => records,
			Err(e) => {
				tracing::warn!(error = %e, "failed to load unscanned records for purge");
				return;
			}
		};

		for record in records {
			if record.reason.starts_with(TX_NOT_FOUND_PREFIX) {
				tracing::info!(
					height = record.block_height,
					tx_id = record.tx_id.as_deref().unwrap_or_default(),
					"purging permanently failed record"
				);
				if let Err(e) = self
					.store
					.delete_unscan_record_by_id(&record.id, symbol)
					.await
				{
					tracing::warn!(error = %e, "failed to purge unscanned record");
				}
			}
		}
	}

	async fn save_block_unscan_record(&self, height: u64, reason: String) {
		let record = UnscanRecord::for_block(height, reason, &self.config.symbol);
		if let Err(e) = self.store.save_unscan_record(&record).await {
			tracing::error!(height, error = %e, "failed to save unscanned record");
		}
	}
}

/// Drives a [`BlockScanner`] on its cron schedule.
///
/// # Type Parameters
/// * `C` - Chain client implementation
/// * `S` - Checkpoint storage implementation
/// * `J` - Job scheduler implementation (must implement JobSchedulerTrait)
pub struct ScannerRunner<C, S, J>
where
	J: JobSchedulerTrait,
{
	scanner: Arc<BlockScanner<C, S>>,
	scheduler: Option<J>,
}

impl<C, S, J> ScannerRunner<C, S, J>
where
	C: ChainClient + Send + Sync + 'static,
	S: CheckpointStore + 'static,
	J: JobSchedulerTrait,
{
	/// Creates a runner for the given scanner.
	pub fn new(scanner: Arc<BlockScanner<C, S>>) -> Self {
		Self {
			scanner,
			scheduler: None,
		}
	}

	/// The scanner being driven.
	pub fn scanner(&self) -> &Arc<BlockScanner<C, S>> {
		&self.scanner
	}

	/// Starts periodic scanning.
	pub async fn start(&mut self) -> Result<(), ScannerError> {
		if self.scheduler.is_some() {
			tracing::info!(
				symbol = self.scanner.symbol(),
				"block scanner already running"
			);
			return Ok(());
		}

		let scheduler = J::new().await.map_err(|e| {
			ScannerError::scheduler_error(
				e.to_string(),
				Some(e),
				Some(std::collections::HashMap::from([(
					"symbol".to_string(),
					self.scanner.symbol().to_string(),
				)])),
			)
		})?;

		let scanner = self.scanner.clone();
		let job = Job::new_async(self.scanner.cron_schedule(), move |_uuid, _l| {
			let scanner = scanner.clone();
			Box::pin(async move {
				if let Err(e) = scanner.scan_task().await {
					tracing::error!(
						symbol = scanner.symbol(),
						error = %e,
						"scan task failed"
					);
				}
			})
		})
		.with_context(|| "Failed to create scan job")?;

		scheduler.add(job).await.map_err(|e| {
			ScannerError::scheduler_error(e.to_string(), Some(e), None)
		})?;

		scheduler.start().await.map_err(|e| {
			ScannerError::scheduler_error(e.to_string(), Some(e), None)
		})?;

		self.scanner.start_scanning();
		self.scheduler = Some(scheduler);

		tracing::info!(symbol = self.scanner.symbol(), "started block scanner");
		Ok(())
	}

	/// Stops periodic scanning and shuts the scheduler down.
	pub async fn stop(&mut self) -> Result<(), ScannerError> {
		if let Some(mut scheduler) = self.scheduler.take() {
			scheduler.shutdown().await.map_err(|e| {
				ScannerError::scheduler_error(e.to_string(), Some(e), None)
			})?;
		}

		self.scanner.stop();

		tracing::info!(symbol = self.scanner.symbol(), "stopped block scanner");
		Ok(())
	}
}
