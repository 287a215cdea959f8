//! Domain models and data structures for the wallet scanner.
//!
//! This module contains all the core data structures used throughout the application:
//!
//! - `blockchain`: Chain-facing models (blocks, headers, transactions, transfers)
//! - `config`: Configuration loading and validation
//! - `core`: Scanning domain models (extraction results, unscanned records)

mod blockchain;
mod config;
mod core;

// Re-export blockchain types
pub use blockchain::{Block, BlockHeader, BlockPosition, Transaction, Transfer};

// Re-export core types
pub use core::{
	extraction_timestamp, CoinInfo, ExtractResult, ExtractedTxData, SourceKey, TransferRecord,
	UnscanRecord,
};

// Re-export config types
pub use config::{CoinConfig, ConfigError, ScannerConfig};
