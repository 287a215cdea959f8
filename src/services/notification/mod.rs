//! Scan event publishing.
//!
//! The scanner publishes three kinds of events: new scanned blocks, fork
//! rollbacks, and per-account extracted transaction data. Consumers
//! implement [`ScanObserver`] and register with an [`EventPublisher`] for
//! the kinds they care about. Delivery is isolated per consumer: a failing
//! observer never blocks delivery to the others, and the publisher reports
//! an aggregate error so the caller can record the failure.

mod error;

pub use error::NotificationError;

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use crate::models::{BlockHeader, ExtractedTxData};

/// The kinds of events the scanner publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// A block was scanned and the cursor advanced past it
	NewBlock,
	/// A previously scanned block was abandoned by a chain reorganization
	Fork,
	/// Wallet-relevant data was extracted from a transaction
	ExtractData,
}

impl EventKind {
	/// All event kinds, for consumers that want everything.
	pub const ALL: [EventKind; 3] = [Self::NewBlock, Self::Fork, Self::ExtractData];
}

/// A consumer of scan events.
///
/// Default implementations ignore every kind, so observers only override
/// the callbacks matching the kinds they subscribe to.
#[async_trait]
pub trait ScanObserver: Send + Sync {
	/// Called for every newly scanned block.
	async fn on_new_block(&self, _header: &BlockHeader) -> Result<(), NotificationError> {
		Ok(())
	}

	/// Called with the abandoned block's header when a fork is handled.
	async fn on_fork(&self, _header: &BlockHeader) -> Result<(), NotificationError> {
		Ok(())
	}

	/// Called with extracted transaction data for one source key.
	async fn on_extract_data(
		&self,
		_source_key: &str,
		_data: &ExtractedTxData,
	) -> Result<(), NotificationError> {
		Ok(())
	}
}

/// Publishes scan events to independently registered consumers.
#[derive(Default)]
pub struct EventPublisher {
	subscribers: RwLock<HashMap<EventKind, Vec<Arc<dyn ScanObserver>>>>,
}

impl EventPublisher {
	/// Creates a publisher with no subscribers.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an observer for the given event kinds.
	pub async fn subscribe(&self, kinds: &[EventKind], observer: Arc<dyn ScanObserver>) {
		let mut subscribers = self.subscribers.write().await;
		for kind in kinds {
			subscribers
				.entry(*kind)
				.or_default()
				.push(observer.clone());
		}
	}

	/// Number of observers registered for a kind.
	pub async fn subscriber_count(&self, kind: EventKind) -> usize {
		self.subscribers
			.read()
			.await
			.get(&kind)
			.map(Vec::len)
			.unwrap_or(0)
	}

	/// Delivers a new-block event to every subscriber.
	pub async fn notify_new_block(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		let observers = self.observers_for(EventKind::NewBlock).await;
		let mut failed = 0;

		for observer in observers {
			if let Err(e) = observer.on_new_block(header).await {
				failed += 1;
				tracing::warn!(
					height = header.height,
					error = %e,
					"new block observer failed"
				);
			}
		}

		aggregate(failed, EventKind::NewBlock)
	}

	/// Delivers a fork event carrying the abandoned block's header.
	pub async fn notify_fork(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		let observers = self.observers_for(EventKind::Fork).await;
		let mut failed = 0;

		for observer in observers {
			if let Err(e) = observer.on_fork(header).await {
				failed += 1;
				tracing::warn!(
					height = header.height,
					error = %e,
					"fork observer failed"
				);
			}
		}

		aggregate(failed, EventKind::Fork)
	}

	/// Delivers extracted data for one source key to every subscriber.
	pub async fn notify_extract_data(
		&self,
		source_key: &str,
		data: &ExtractedTxData,
	) -> Result<(), NotificationError> {
		let observers = self.observers_for(EventKind::ExtractData).await;
		let mut failed = 0;

		for observer in observers {
			if let Err(e) = observer.on_extract_data(source_key, data).await {
				failed += 1;
				tracing::warn!(
					source_key,
					error = %e,
					"extract data observer failed"
				);
			}
		}

		aggregate(failed, EventKind::ExtractData)
	}

	async fn observers_for(&self, kind: EventKind) -> Vec<Arc<dyn ScanObserver>> {
		self.subscribers
			.read()
			.await
			.get(&kind)
			.cloned()
			.unwrap_or_default()
	}
}

fn aggregate(failed: usize, kind: EventKind) -> Result<(), NotificationError> {
	if failed > 0 {
		Err(NotificationError::dispatch_error(
			format!("{} observer(s) failed for {:?} event", failed, kind),
			None,
			None,
		))
	} else {
		Ok(())
	}
}

/// Observer that logs every event it receives.
///
/// Registered by the binary as the default consumer so scan activity is
/// visible without a wallet database attached.
pub struct TracingScanObserver;

#[async_trait]
impl ScanObserver for TracingScanObserver {
	async fn on_new_block(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		tracing::info!(
			height = header.height,
			hash = %header.hash,
			"new block scanned"
		);
		Ok(())
	}

	async fn on_fork(&self, header: &BlockHeader) -> Result<(), NotificationError> {
		tracing::warn!(
			height = header.height,
			hash = %header.hash,
			"block abandoned by fork"
		);
		Ok(())
	}

	async fn on_extract_data(
		&self,
		source_key: &str,
		data: &ExtractedTxData,
	) -> Result<(), NotificationError> {
		tracing::info!(
			source_key,
			debits = data.debits.len(),
			credits = data.credits.len(),
			"extracted transaction data"
		);
		Ok(())
	}
}
