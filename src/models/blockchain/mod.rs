//! Chain-facing data structures.
//!
//! These models mirror what the node hands back: block headers, block
//! bodies with their transaction id lists, and decoded transactions with
//! their transfer events. All of them are immutable once produced by the
//! chain client and are persisted as JSON by the checkpoint store.

use serde::{Deserialize, Serialize};

/// Header of a scanned block as tracked by the wallet.
///
/// `fork` is false for ordinary new-block notifications and set only when
/// the header is delivered as part of a rollback notification, flagging the
/// block as abandoned by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Block height
	pub height: u64,
	/// Block hash
	pub hash: String,
	/// Hash of the previous block
	pub prev_hash: String,
	/// Whether this header is delivered as part of a rollback
	pub fork: bool,
	/// Chain symbol the header belongs to
	pub symbol: String,
}

/// A block body: header fields plus the ordered transaction id list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
	/// Block height
	pub height: u64,
	/// Block hash
	pub hash: String,
	/// Hash of the previous block
	pub prev_hash: String,
	/// Ordered transaction ids contained in the block
	pub transactions: Vec<String>,
}

impl Block {
	/// Builds the header view of this block for notifications and the
	/// checkpoint cursor.
	pub fn header(&self, symbol: &str, fork: bool) -> BlockHeader {
		BlockHeader {
			height: self.height,
			hash: self.hash.clone(),
			prev_hash: self.prev_hash.clone(),
			fork,
			symbol: symbol.to_string(),
		}
	}
}

/// A decoded on-chain transaction with its transfer events.
///
/// Created per extraction call and discarded after notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	/// Transaction id
	pub tx_id: String,
	/// Height of the containing block (0 while unconfirmed)
	pub block_height: u64,
	/// Hash of the containing block (empty while unconfirmed)
	pub block_hash: String,
	/// Transfer events emitted by the transaction, in event order
	pub transfers: Vec<Transfer>,
}

/// One transfer event inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
	/// Sending address
	pub from: String,
	/// Receiving address
	pub to: String,
	/// Contract the transfer was executed against
	pub contract_address: String,
	/// Amount in the contract's smallest unit, as reported by the node
	pub amount: String,
	/// Whether this transfer pays the network fee
	pub is_fee: bool,
}

/// Where a batch of transactions sits on the chain.
///
/// Confirmed batches carry the height and hash of their block; mempool
/// batches are explicitly unconfirmed rather than reusing a height-0
/// sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPosition {
	/// Transactions contained in a confirmed block
	Confirmed {
		/// Height of the block
		height: u64,
		/// Hash of the block
		hash: String,
	},
	/// Transactions still in the mempool
	Mempool,
}

impl BlockPosition {
	/// Height of the containing block, or 0 for mempool batches.
	pub fn height(&self) -> u64 {
		match self {
			Self::Confirmed { height, .. } => *height,
			Self::Mempool => 0,
		}
	}

	/// Hash of the containing block, or empty for mempool batches.
	pub fn hash(&self) -> &str {
		match self {
			Self::Confirmed { hash, .. } => hash,
			Self::Mempool => "",
		}
	}

	/// Whether the batch belongs to a confirmed block.
	pub fn is_confirmed(&self) -> bool {
		matches!(self, Self::Confirmed { .. })
	}
}
