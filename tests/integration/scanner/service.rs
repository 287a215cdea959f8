//! Scenario tests for the scan loop: cursor advancement, fork rollback,
//! cold start, fetch-failure bookkeeping and the retry pass.

use mockall::predicate::eq;
use std::sync::Arc;

use crate::integration::mocks::{
	chained_block, test_config, CollectingObserver, MemoryCheckpointStore, MockChainClient,
};
use wallet_scanner::{
	models::{BlockHeader, ScannerConfig, Transaction, UnscanRecord},
	repositories::CheckpointStore,
	services::{
		blockchain::ChainClientError,
		notification::{EventKind, EventPublisher},
		scanner::{BlockScanner, InMemoryAddressBook, ScannerError, ScannerState},
	},
};

type TestScanner = BlockScanner<MockChainClient, MemoryCheckpointStore>;

async fn build_scanner(
	config: ScannerConfig,
	client: MockChainClient,
	store: MemoryCheckpointStore,
) -> (Arc<TestScanner>, Arc<CollectingObserver>) {
	let publisher = Arc::new(EventPublisher::new());
	let observer = CollectingObserver::new();
	publisher.subscribe(&EventKind::ALL, observer.clone()).await;

	let scanner = BlockScanner::new(
		config,
		Arc::new(client),
		Arc::new(store),
		Arc::new(InMemoryAddressBook::new("ONT")),
		publisher,
	)
	.expect("scanner must build");

	(Arc::new(scanner), observer)
}

fn cursor(height: u64, hash: &str) -> BlockHeader {
	BlockHeader {
		height,
		hash: hash.to_string(),
		prev_hash: String::new(),
		fork: false,
		symbol: "ONT".to_string(),
	}
}

/// `h{height}` block bodies served by hash or height.
fn scripted_get_block(hash: &str) -> Result<wallet_scanner::models::Block, ChainClientError> {
	let height: u64 = hash
		.trim_start_matches('h')
		.parse()
		.map_err(|_| ChainClientError::request_error("unknown hash", None, None))?;
	Ok(chained_block(height, vec![]))
}

#[tokio::test]
async fn test_scan_advances_cursor_to_confirmed_tip() {
	let store = MemoryCheckpointStore::new();
	store.seed_cursor(cursor(100, "h100"));

	let mut client = MockChainClient::new();
	client.expect_get_block_height().returning(|| Ok(103));
	client
		.expect_get_block_hash()
		.returning(|height| Ok(format!("h{}", height)));
	client.expect_get_block().returning(scripted_get_block);

	let (scanner, observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner.start_scanning();
	scanner.scan_task().await.expect("scan task must succeed");

	// Tip 103 minus one confirmation: heights 101 and 102 were scanned
	let head = store.get_current_block_head("ONT").await.unwrap().unwrap();
	assert_eq!(head.height, 102);
	assert_eq!(head.hash, "h102");

	let history: Vec<u64> = store.cursor_history().iter().map(|h| h.height).collect();
	assert_eq!(history, vec![101, 102]);

	assert_eq!(observer.new_block_heights(), vec![101, 102]);
	assert!(observer.fork_headers().is_empty());

	// Scanned blocks are cached locally for fork recovery
	assert!(store.get_local_block(101, "ONT").await.unwrap().is_some());
	assert!(store.get_local_block(102, "ONT").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reorg_rolls_back_and_notifies_fork() {
	let store = MemoryCheckpointStore::new();
	// Locally we scanned up to 99, but our block 99 is not the chain's
	store.seed_cursor(cursor(99, "local99"));
	store.seed_block(
		"ONT",
		wallet_scanner::models::Block {
			height: 99,
			hash: "local99".to_string(),
			prev_hash: "h98".to_string(),
			transactions: vec![],
		},
	);
	store.seed_block("ONT", chained_block(98, vec![]));

	// Records of the abandoned branch must be dropped without retrying:
	// retrying "gone-tx" would hit an unscripted mock call and panic
	store.seed_unscan_record(UnscanRecord::for_transaction(
		99, "gone-tx", "decode failed", "ONT",
	));
	// A record on the surviving branch is retried and cleared
	store.seed_unscan_record(UnscanRecord::for_transaction(
		97, "tx97", "node unreachable", "ONT",
	));

	let mut client = MockChainClient::new();
	client.expect_get_block_height().returning(|| Ok(102));
	client
		.expect_get_block_hash()
		.returning(|height| Ok(format!("h{}", height)));
	client.expect_get_block().returning(scripted_get_block);
	client
		.expect_get_transaction()
		.with(eq("tx97"))
		.times(1)
		.returning(|tx_id| {
			Ok(Transaction {
				tx_id: tx_id.to_string(),
				block_height: 97,
				block_hash: "h97".to_string(),
				transfers: vec![],
			})
		});

	let (scanner, observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner.start_scanning();
	scanner.scan_task().await.expect("scan task must succeed");

	// The first cursor write is the rollback: fork at 100, depth 2
	let history = store.cursor_history();
	assert_eq!(history[0].height, 98);
	assert_eq!(history[0].hash, "h98");

	// Exactly one fork notification, carrying the abandoned local block
	let forks = observer.fork_headers();
	assert_eq!(forks.len(), 1);
	assert_eq!(forks[0].height, 99);
	assert_eq!(forks[0].hash, "local99");
	assert!(forks[0].fork);

	// After the rollback the scan resumed forward to the confirmed tip
	let head = store.get_current_block_head("ONT").await.unwrap().unwrap();
	assert_eq!(head.height, 101);
	assert_eq!(
		observer.new_block_heights(),
		vec![99, 100, 101],
		"scan resumes from the rollback target"
	);

	// Both record groups are gone: 99 via the fork, 97 via the retry pass
	assert!(store.get_unscan_records("ONT").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cold_start_begins_near_tip() {
	let store = MemoryCheckpointStore::new();

	let mut client = MockChainClient::new();
	client.expect_get_block_height().returning(|| Ok(100));
	client
		.expect_get_block_by_height()
		.with(eq(98))
		.returning(|height| Ok(chained_block(height, vec![])));
	client
		.expect_get_block_hash()
		.returning(|height| Ok(format!("h{}", height)));
	client.expect_get_block().returning(scripted_get_block);

	let (scanner, observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner.start_scanning();
	scanner.scan_task().await.expect("scan task must succeed");

	// Started at tip - 2 = 98, scanned 99 (the confirmed tip)
	let head = store.get_current_block_head("ONT").await.unwrap().unwrap();
	assert_eq!(head.height, 99);
	assert_eq!(observer.new_block_heights(), vec![99]);
}

#[tokio::test]
async fn test_block_fetch_failure_is_recorded_not_fatal() {
	let store = MemoryCheckpointStore::new();
	store.seed_cursor(cursor(100, "h100"));

	let mut client = MockChainClient::new();
	client.expect_get_block_height().returning(|| Ok(102));
	client
		.expect_get_block_hash()
		.with(eq(101))
		.returning(|_| Err(ChainClientError::request_error("node unreachable", None, None)));
	client
		.expect_get_block_by_height()
		.with(eq(101))
		.returning(|_| Err(ChainClientError::request_error("node unreachable", None, None)));

	let (scanner, observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner.start_scanning();
	scanner.scan_task().await.expect("scan task must succeed");

	// The failed height is recorded for retry as a whole-block record
	let records = store.get_unscan_records("ONT").await.unwrap();
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].block_height, 101);
	assert_eq!(records[0].tx_id, None);

	// The cursor never advanced
	assert!(store.cursor_history().is_empty());
	assert!(observer.new_block_heights().is_empty());
}

#[tokio::test]
async fn test_retry_pass_is_idempotent() {
	let store = MemoryCheckpointStore::new();
	store.seed_unscan_record(UnscanRecord::for_transaction(
		50, "txa", "node unreachable", "ONT",
	));
	// A whole-block record: the transaction list must be re-derived
	store.seed_unscan_record(UnscanRecord::for_block(51, "node unreachable", "ONT"));

	let mut client = MockChainClient::new();
	client
		.expect_get_block_hash()
		.with(eq(50))
		.times(1)
		.returning(|height| Ok(format!("h{}", height)));
	client
		.expect_get_block_by_height()
		.with(eq(51))
		.times(1)
		.returning(|height| Ok(chained_block(height, vec!["txb".to_string()])));
	client.expect_get_transaction().returning(|tx_id| {
		Ok(Transaction {
			tx_id: tx_id.to_string(),
			block_height: 0,
			block_hash: String::new(),
			transfers: vec![],
		})
	});

	let (scanner, _observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner
		.rescan_failed_records()
		.await
		.expect("retry pass must succeed");
	assert!(store.get_unscan_records("ONT").await.unwrap().is_empty());

	// A second pass over the now-empty set does nothing
	scanner
		.rescan_failed_records()
		.await
		.expect("retry pass must stay idempotent");
	assert!(store.get_unscan_records("ONT").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_permanently_missing_transactions_are_purged() {
	let store = MemoryCheckpointStore::new();
	store.seed_unscan_record(UnscanRecord::for_transaction(
		60, "gone", "node unreachable", "ONT",
	));

	let mut client = MockChainClient::new();
	client
		.expect_get_block_hash()
		.with(eq(60))
		.returning(|height| Ok(format!("h{}", height)));
	client
		.expect_get_transaction()
		.with(eq("gone"))
		.returning(|_| {
			Err(ChainClientError::transaction_not_found(
				"[-5]No information available about transaction",
				None,
			))
		});

	let (scanner, _observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner
		.rescan_failed_records()
		.await
		.expect("retry pass must succeed");

	// The node says the transaction no longer exists: the record is
	// deleted outright instead of being retried forever
	assert!(store.get_unscan_records("ONT").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_paused_scanner_ends_task_immediately() {
	let store = MemoryCheckpointStore::new();
	store.seed_cursor(cursor(100, "h100"));

	// No expectations: any node call would panic
	let client = MockChainClient::new();

	let (scanner, observer) = build_scanner(test_config(), client, store.clone()).await;

	scanner.start_scanning();
	scanner.pause();
	scanner.scan_task().await.expect("paused task returns Ok");

	assert!(store.cursor_history().is_empty());
	assert!(observer.new_block_heights().is_empty());
}

#[tokio::test]
async fn test_lifecycle_state_transitions() {
	let store = MemoryCheckpointStore::new();
	let client = MockChainClient::new();

	let (scanner, _observer) = build_scanner(test_config(), client, store).await;

	assert_eq!(scanner.state(), ScannerState::Idle);
	assert!(!scanner.is_scanning());

	scanner.start_scanning();
	assert_eq!(scanner.state(), ScannerState::Scanning);
	assert!(scanner.is_scanning());

	scanner.pause();
	assert_eq!(scanner.state(), ScannerState::Paused);
	assert!(!scanner.is_scanning());

	scanner.restart();
	assert_eq!(scanner.state(), ScannerState::Scanning);
	assert!(scanner.is_scanning());

	scanner.stop();
	assert_eq!(scanner.state(), ScannerState::Stopped);

	// A stopped scanner cannot be restarted
	scanner.restart();
	assert_eq!(scanner.state(), ScannerState::Stopped);
	assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn test_set_rescan_block_height() {
	let store = MemoryCheckpointStore::new();
	store.seed_block("ONT", chained_block(42, vec![]));

	let mut client = MockChainClient::new();
	client
		.expect_get_block_by_height()
		.with(eq(9))
		.returning(|height| Ok(chained_block(height, vec![])));

	let (scanner, _observer) = build_scanner(test_config(), client, store.clone()).await;

	// Height zero is rejected
	let err = scanner.set_rescan_block_height(0).await.unwrap_err();
	assert!(matches!(err, ScannerError::ConfigError(_)));

	scanner
		.set_rescan_block_height(10)
		.await
		.expect("rescan height must be accepted");

	// The cursor points one below the requested height
	let head = store.get_current_block_head("ONT").await.unwrap().unwrap();
	assert_eq!(head.height, 9);
	assert_eq!(head.hash, "h9");

	// Stale cached bodies are dropped
	assert!(store.get_local_block(42, "ONT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
	let mut config = test_config();
	config.max_extracting = 0;

	let result = BlockScanner::new(
		config,
		Arc::new(MockChainClient::new()),
		Arc::new(MemoryCheckpointStore::new()),
		Arc::new(InMemoryAddressBook::new("ONT")),
		Arc::new(EventPublisher::new()),
	);

	assert!(matches!(result, Err(ScannerError::ConfigError(_))));
}
