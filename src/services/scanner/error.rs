//! Scanner error types and handling.
//!
//! Covers scheduling, node access, extraction and checkpoint storage
//! failures of the scan loop. Per-transaction and per-block failures are
//! absorbed into unscanned records; these errors surface only batch-level
//! or configuration problems.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Represents possible errors that can occur during block scanning
#[derive(ThisError, Debug)]
pub enum ScannerError {
	/// Errors related to the periodic task scheduler
	#[error("Scheduler error: {0}")]
	SchedulerError(ErrorContext),

	/// Errors related to node connectivity
	#[error("Network error: {0}")]
	NetworkError(ErrorContext),

	/// Errors related to block or transaction processing
	#[error("Processing error: {0}")]
	ProcessingError(ErrorContext),

	/// Errors related to checkpoint storage
	#[error("Storage error: {0}")]
	StorageError(ErrorContext),

	/// Errors related to invalid scanner parameters
	#[error("Configuration error: {0}")]
	ConfigError(ErrorContext),

	/// Other errors that don't fit into the categories above
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ScannerError {
	// Scheduler error
	pub fn scheduler_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::SchedulerError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Network error
	pub fn network_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::NetworkError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Processing error
	pub fn processing_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ProcessingError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Storage error
	pub fn storage_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::StorageError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Config error
	pub fn config_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ConfigError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for ScannerError {
	fn trace_id(&self) -> String {
		match self {
			Self::SchedulerError(ctx) => ctx.trace_id.clone(),
			Self::NetworkError(ctx) => ctx.trace_id.clone(),
			Self::ProcessingError(ctx) => ctx.trace_id.clone(),
			Self::StorageError(ctx) => ctx.trace_id.clone(),
			Self::ConfigError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
