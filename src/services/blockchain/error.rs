//! Chain client error types and handling.
//!
//! Distinguishes transient request failures (retried via unscanned records)
//! from the permanent "transaction not found" class, which is purged from
//! the retry set instead of being retried forever.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Reason prefix that marks an unscanned record as permanently failed.
///
/// Matches the `Display` output of [`ChainClientError::TransactionNotFound`],
/// so persisted reasons can be classified without re-contacting the node.
pub const TX_NOT_FOUND_PREFIX: &str = "transaction not found";

/// Represents possible errors when talking to the chain node
#[derive(ThisError, Debug)]
pub enum ChainClientError {
	/// Errors related to network connectivity issues
	#[error("Request error: {0}")]
	RequestError(ErrorContext),

	/// Errors related to malformed responses
	#[error("Response parse error: {0}")]
	ResponseParseError(ErrorContext),

	/// The node explicitly reports the transaction does not exist.
	/// This is a terminal failure class, not retried.
	#[error("transaction not found: {0}")]
	TransactionNotFound(ErrorContext),

	/// Other errors that don't fit into the categories above
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl ChainClientError {
	// Request error
	pub fn request_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::RequestError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Response parse error
	pub fn response_parse_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ResponseParseError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Transaction not found
	pub fn transaction_not_found(
		msg: impl Into<String>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::TransactionNotFound(ErrorContext::new_with_log(msg, None, metadata))
	}

	/// Whether this error is the permanent not-found class.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::TransactionNotFound(_))
	}
}

impl TraceableError for ChainClientError {
	fn trace_id(&self) -> String {
		match self {
			Self::RequestError(ctx) => ctx.trace_id.clone(),
			Self::ResponseParseError(ctx) => ctx.trace_id.clone(),
			Self::TransactionNotFound(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
