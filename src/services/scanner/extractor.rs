//! Bounded-concurrency transaction extraction pipeline.
//!
//! Given the transaction ids of one block (or a mempool batch), the
//! pipeline fetches and decodes each transaction on its own task, bounded
//! by a fixed-size pool of worker tokens, and drains results as they
//! complete. Decoding order is irrelevant; completion is detected once,
//! when every submitted transaction has produced exactly one result.
//!
//! A single failed transaction never aborts the batch: it is persisted as
//! an unscanned record for retry and counted, and the batch returns an
//! aggregate error only after every transaction was attempted and every
//! successful extraction was delivered to the observers.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::{
	models::{
		extraction_timestamp, BlockPosition, CoinConfig, CoinInfo, ExtractResult, ScannerConfig,
		Transaction, TransferRecord, UnscanRecord,
	},
	repositories::CheckpointStore,
	services::{
		blockchain::ChainClient,
		notification::EventPublisher,
		scanner::{error::ScannerError, AddressResolver},
	},
};

/// Shared decode context cloned into every extraction worker.
struct ExtractContext<C> {
	client: Arc<C>,
	resolver: Arc<dyn AddressResolver>,
	symbol: String,
	chain_name: String,
	native_coin: CoinConfig,
	gas_coin: CoinConfig,
}

impl<C: ChainClient> ExtractContext<C> {
	/// Resolves a contract address to the native coin or gas token.
	///
	/// Transfers against any other contract are not wallet-relevant and
	/// produce no balance entries.
	fn resolve_coin(&self, contract_address: &str) -> Option<CoinInfo> {
		let coin = if contract_address == self.native_coin.contract_address {
			&self.native_coin
		} else if contract_address == self.gas_coin.contract_address {
			&self.gas_coin
		} else {
			return None;
		};

		Some(CoinInfo {
			symbol: self.symbol.clone(),
			contract_address: coin.contract_address.clone(),
			token: coin.token.clone(),
			name: self.chain_name.clone(),
			decimals: coin.decimals,
		})
	}

	/// Fetches one transaction and decodes its wallet-relevant transfers.
	async fn extract_transaction(&self, position: &BlockPosition, tx_id: &str) -> ExtractResult {
		let mut result = ExtractResult::new(tx_id, position.height());

		let mut tx = match self.client.get_transaction(tx_id).await {
			Ok(tx) => tx,
			Err(e) => {
				tracing::debug!(tx_id, error = %e, "failed to fetch transaction");
				return result.fail(e.to_string());
			}
		};

		// Prefer the caller-provided position when the node has not yet
		// attributed the transaction to a block
		if let BlockPosition::Confirmed { height, hash } = position {
			if tx.block_height == 0 {
				tx.block_height = *height;
				tx.block_hash = hash.clone();
			}
		}

		self.decode_transfers(&tx, &mut result);
		result.success = true;
		result
	}

	/// Turns the transfers of a decoded transaction into per-account
	/// debit/credit records.
	fn decode_transfers(&self, tx: &Transaction, result: &mut ExtractResult) {
		let created_at = extraction_timestamp();

		let record = |address: &str, amount: &str, coin: &CoinInfo, is_fee: bool| TransferRecord {
			tx_id: tx.tx_id.clone(),
			address: address.to_string(),
			amount: amount.to_string(),
			coin: coin.clone(),
			is_fee,
			block_height: tx.block_height,
			block_hash: tx.block_hash.clone(),
			created_at,
		};

		for transfer in &tx.transfers {
			let coin = match self.resolve_coin(&transfer.contract_address) {
				Some(coin) => coin,
				None => continue,
			};

			let from_key = self.resolver.resolve(&transfer.from, &self.symbol);
			let to_key = self.resolver.resolve(&transfer.to, &self.symbol);

			if let Some(from_key) = &from_key {
				let entry = result.extract_data.entry(from_key.clone()).or_default();
				entry
					.debits
					.push(record(&transfer.from, &transfer.amount, &coin, transfer.is_fee));

				if to_key.as_ref() == Some(from_key) {
					// Transfer within one account: paired credit, not a
					// separate double-counted transaction
					entry
						.credits
						.push(record(&transfer.to, &transfer.amount, &coin, false));
				} else {
					// Zero-value counterpart so consumers see a complete
					// transaction shape
					entry.credits.push(record(&transfer.to, "0", &coin, false));
				}
			}

			if let Some(to_key) = &to_key {
				if from_key.as_ref() != Some(to_key) {
					let entry = result.extract_data.entry(to_key.clone()).or_default();
					entry
						.credits
						.push(record(&transfer.to, &transfer.amount, &coin, false));
					entry.debits.push(record(&transfer.from, "0", &coin, false));
				}
			}
		}
	}
}

/// Extraction pipeline for one scanned chain.
///
/// The worker-token pool is created once per scanner and shared by every
/// batch, so the concurrency bound holds across overlapping callers.
pub struct TransactionExtractor<C, S> {
	context: Arc<ExtractContext<C>>,
	store: Arc<S>,
	publisher: Arc<EventPublisher>,
	tokens: Arc<Semaphore>,
}

impl<C, S> TransactionExtractor<C, S>
where
	C: ChainClient + Send + Sync + 'static,
	S: CheckpointStore + 'static,
{
	/// Creates a new extraction pipeline.
	pub fn new(
		config: &ScannerConfig,
		client: Arc<C>,
		store: Arc<S>,
		resolver: Arc<dyn AddressResolver>,
		publisher: Arc<EventPublisher>,
	) -> Self {
		Self {
			context: Arc::new(ExtractContext {
				client,
				resolver,
				symbol: config.symbol.clone(),
				chain_name: config.name.clone(),
				native_coin: config.native_coin.clone(),
				gas_coin: config.gas_coin.clone(),
			}),
			store,
			publisher,
			tokens: Arc::new(Semaphore::new(config.max_extracting)),
		}
	}

	/// Extracts every transaction of a batch and delivers the results.
	///
	/// Returns an error iff at least one transaction failed extraction or
	/// delivery; the cursor still advances past the block in that case, the
	/// persisted unscanned records drive the retry.
	pub async fn batch_extract(
		&self,
		position: &BlockPosition,
		tx_ids: &[String],
	) -> Result<(), ScannerError> {
		if tx_ids.is_empty() {
			return Ok(());
		}

		let (sender, mut receiver) = mpsc::channel::<ExtractResult>(tx_ids.len());

		for tx_id in tx_ids {
			let context = self.context.clone();
			let tokens = self.tokens.clone();
			let position = position.clone();
			let tx_id = tx_id.clone();
			let sender = sender.clone();

			tokio::spawn(async move {
				// Worker token bounds how many fetches are in flight
				let Ok(_permit) = tokens.acquire_owned().await else {
					return;
				};
				let result = context.extract_transaction(&position, &tx_id).await;
				let _ = sender.send(result).await;
			});
		}

		// The channel closes once every worker has sent its result
		drop(sender);

		let should_done = tx_ids.len();
		let mut done = 0usize;
		let mut failed = 0usize;

		while let Some(result) = receiver.recv().await {
			done += 1;

			if result.success {
				for (source_key, data) in &result.extract_data {
					if let Err(e) = self.publisher.notify_extract_data(source_key, data).await {
						failed += 1;
						self.save_unscan_record(
							position,
							&result.tx_id,
							format!("extract data notify failed: {}", e),
						)
						.await;
					}
				}
			} else {
				failed += 1;
				let reason = result
					.reason
					.clone()
					.unwrap_or_else(|| "extraction failed".to_string());
				self.save_unscan_record(position, &result.tx_id, reason).await;
			}
		}

		tracing::debug!(
			height = position.height(),
			done,
			failed,
			"batch extraction finished"
		);

		if failed > 0 {
			Err(ScannerError::processing_error(
				format!(
					"{} of {} transactions failed extraction at height {}",
					failed,
					should_done,
					position.height()
				),
				None,
				None,
			))
		} else {
			Ok(())
		}
	}

	/// Persists a retry marker for a failed transaction.
	///
	/// Mempool batches are not persisted: their transactions are extracted
	/// again once they confirm into a block.
	async fn save_unscan_record(&self, position: &BlockPosition, tx_id: &str, reason: String) {
		match position {
			BlockPosition::Confirmed { height, .. } => {
				let record = UnscanRecord::for_transaction(
					*height,
					tx_id,
					reason,
					&self.context.symbol,
				);
				if let Err(e) = self.store.save_unscan_record(&record).await {
					tracing::error!(
						height,
						tx_id,
						error = %e,
						"failed to save unscanned record"
					);
				}
			}
			BlockPosition::Mempool => {
				tracing::debug!(tx_id, reason = %reason, "mempool extraction failed, not recorded");
			}
		}
	}
}
