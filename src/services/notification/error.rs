//! Notification error types.

use crate::utils::logging::error::{ErrorContext, TraceableError};
use std::collections::HashMap;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Represents errors during event delivery to observers
#[derive(ThisError, Debug)]
pub enum NotificationError {
	/// One or more observers rejected a delivery
	#[error("Dispatch error: {0}")]
	DispatchError(ErrorContext),

	/// An observer-internal failure surfaced by a consumer
	#[error("Observer error: {0}")]
	ObserverError(ErrorContext),

	/// Other errors that don't fit into the categories above
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl NotificationError {
	// Dispatch error
	pub fn dispatch_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::DispatchError(ErrorContext::new_with_log(msg, source, metadata))
	}

	// Observer error
	pub fn observer_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::ObserverError(ErrorContext::new_with_log(msg, source, metadata))
	}
}

impl TraceableError for NotificationError {
	fn trace_id(&self) -> String {
		match self {
			Self::DispatchError(ctx) => ctx.trace_id.clone(),
			Self::ObserverError(ctx) => ctx.trace_id.clone(),
			Self::Other(_) => Uuid::new_v4().to_string(),
		}
	}
}
