//! Core domain models for the scanning engine.
//!
//! Extraction results, the per-account transfer records they aggregate, and
//! the persisted markers for failed scans live here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Logical account/wallet identifier an address resolves to.
pub type SourceKey = String;

/// Coin/token identity attached to a transfer record.
///
/// Resolved from configuration (native coin or gas token); transfers against
/// unrecognized contracts never produce records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinInfo {
	/// Chain symbol
	pub symbol: String,
	/// Contract address the coin is implemented by
	pub contract_address: String,
	/// Token ticker (e.g. the native coin or gas token ticker)
	pub token: String,
	/// Human-readable chain name
	pub name: String,
	/// Decimal places of the token's smallest unit
	pub decimals: u8,
}

/// One side of a wallet-relevant transfer: a debit from or credit to a
/// tracked address.
///
/// Synthetic counterparts (the zero-value side added so downstream
/// consumers always see a complete transaction shape) carry amount `"0"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
	/// Transaction the record was extracted from
	pub tx_id: String,
	/// The tracked or counterparty address
	pub address: String,
	/// Amount in the coin's smallest unit
	pub amount: String,
	/// Coin the amount is denominated in
	pub coin: CoinInfo,
	/// Whether the record represents a network fee payment
	pub is_fee: bool,
	/// Height of the containing block (0 while unconfirmed)
	pub block_height: u64,
	/// Hash of the containing block (empty while unconfirmed)
	pub block_hash: String,
	/// Unix timestamp of extraction
	pub created_at: i64,
}

/// Wallet-relevant data extracted from one transaction for one source key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTxData {
	/// Debits from tracked addresses
	pub debits: Vec<TransferRecord>,
	/// Credits to tracked addresses
	pub credits: Vec<TransferRecord>,
}

impl ExtractedTxData {
	/// Whether the extraction produced any balance entries.
	pub fn is_empty(&self) -> bool {
		self.debits.is_empty() && self.credits.is_empty()
	}
}

/// Result of extracting one transaction, produced by one extraction worker
/// and consumed by exactly one save step.
#[derive(Debug, Clone)]
pub struct ExtractResult {
	/// Transaction id the result belongs to
	pub tx_id: String,
	/// Height the transaction was attributed to (0 for mempool batches)
	pub block_height: u64,
	/// Whether fetch and decode succeeded
	pub success: bool,
	/// Failure description when `success` is false
	pub reason: Option<String>,
	/// Extracted data keyed by source key
	pub extract_data: HashMap<SourceKey, ExtractedTxData>,
}

impl ExtractResult {
	/// Creates an empty result for a transaction, marked unsuccessful until
	/// the worker fills it in.
	pub fn new(tx_id: &str, block_height: u64) -> Self {
		Self {
			tx_id: tx_id.to_string(),
			block_height,
			success: false,
			reason: None,
			extract_data: HashMap::new(),
		}
	}

	/// Marks the result failed with the given reason.
	pub fn fail(mut self, reason: impl Into<String>) -> Self {
		self.success = false;
		self.reason = Some(reason.into());
		self
	}
}

/// Persisted marker that a height (or a single transaction at that height)
/// failed processing and needs retry.
///
/// A record without a transaction id means the whole block's transaction
/// list must be re-fetched on retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscanRecord {
	/// Unique record id
	pub id: String,
	/// Chain symbol the record belongs to
	pub symbol: String,
	/// Height that failed
	pub block_height: u64,
	/// Failing transaction, if the failure was transaction-scoped
	pub tx_id: Option<String>,
	/// Failure description
	pub reason: String,
}

impl UnscanRecord {
	/// Creates a new record for a whole-block failure.
	pub fn for_block(height: u64, reason: impl Into<String>, symbol: &str) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			symbol: symbol.to_string(),
			block_height: height,
			tx_id: None,
			reason: reason.into(),
		}
	}

	/// Creates a new record for a single failed transaction.
	pub fn for_transaction(
		height: u64,
		tx_id: impl Into<String>,
		reason: impl Into<String>,
		symbol: &str,
	) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			symbol: symbol.to_string(),
			block_height: height,
			tx_id: Some(tx_id.into()),
			reason: reason.into(),
		}
	}
}

/// Current unix timestamp used to stamp extraction records.
pub fn extraction_timestamp() -> i64 {
	Utc::now().timestamp()
}
