//! Tests for the JSON-RPC chain client against a mock node.

use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

use wallet_scanner::{
	services::blockchain::{ChainClient, ChainClientError, HttpChainClient},
	utils::http::{JitterSetting, RetryConfig},
};

/// Retry policy that fails fast so error-path tests stay quick.
fn no_retry() -> RetryConfig {
	RetryConfig {
		max_retries: 0,
		base_for_backoff: 2,
		initial_backoff: Duration::from_millis(10),
		max_backoff: Duration::from_millis(50),
		jitter: JitterSetting::None,
	}
}

fn rpc_result(result: serde_json::Value) -> String {
	json!({
		"id": "1",
		"error": 0,
		"desc": "",
		"result": result,
	})
	.to_string()
}

async fn mock_method(
	server: &mut mockito::ServerGuard,
	method: &str,
	body: String,
) -> mockito::Mock {
	server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({ "method": method })))
		.with_status(200)
		.with_header("content-type", "application/json")
		.with_body(body)
		.create_async()
		.await
}

#[tokio::test]
async fn test_get_block_height_is_count_minus_one() {
	let mut server = mockito::Server::new_async().await;
	let mock = mock_method(&mut server, "getblockcount", rpc_result(json!(101))).await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	assert_eq!(client.get_block_height().await.unwrap(), 100);

	mock.assert_async().await;
}

#[tokio::test]
async fn test_get_block_hash() {
	let mut server = mockito::Server::new_async().await;
	let mock = mock_method(&mut server, "getblockhash", rpc_result(json!("deadbeef"))).await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	assert_eq!(client.get_block_hash(42).await.unwrap(), "deadbeef");

	mock.assert_async().await;
}

#[tokio::test]
async fn test_get_block_decodes_body() {
	let mut server = mockito::Server::new_async().await;
	let block_json = json!({
		"Hash": "b100",
		"Header": {
			"Height": 100,
			"PrevBlockHash": "b99"
		},
		"Transactions": [
			{ "Hash": "tx1" },
			{ "Hash": "tx2" }
		]
	});
	let mock = mock_method(&mut server, "getblock", rpc_result(block_json)).await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	let block = client.get_block("b100").await.unwrap();

	assert_eq!(block.height, 100);
	assert_eq!(block.hash, "b100");
	assert_eq!(block.prev_hash, "b99");
	assert_eq!(block.transactions, vec!["tx1", "tx2"]);

	mock.assert_async().await;
}

#[tokio::test]
async fn test_get_transaction_combines_detail_and_events() {
	let mut server = mockito::Server::new_async().await;

	let raw_tx = json!({
		"Hash": "txa",
		"Height": 77,
		"Payer": "Aalice"
	});
	let events = json!({
		"TxHash": "txa",
		"Notify": [
			{
				"ContractAddress": "0100000000000000000000000000000000000000",
				"States": ["transfer", "Aalice", "Abob", 500]
			},
			{
				"ContractAddress": "0200000000000000000000000000000000000000",
				"States": ["transfer", "Aalice", "Afee", "10000000"]
			}
		]
	});

	let tx_mock = mock_method(&mut server, "getrawtransaction", rpc_result(raw_tx)).await;
	let hash_mock = mock_method(&mut server, "getblockhash", rpc_result(json!("b77"))).await;
	let events_mock = mock_method(&mut server, "getsmartcodeevent", rpc_result(events)).await;

	let client =
		HttpChainClient::new(&server.url(), Some("Afee".to_string()), &no_retry()).unwrap();
	let tx = client.get_transaction("txa").await.unwrap();

	assert_eq!(tx.tx_id, "txa");
	assert_eq!(tx.block_height, 77);
	assert_eq!(tx.block_hash, "b77");
	assert_eq!(tx.transfers.len(), 2);
	assert_eq!(tx.transfers[0].amount, "500");
	assert!(!tx.transfers[0].is_fee);
	// The transfer to the fee-collection address is flagged
	assert!(tx.transfers[1].is_fee);

	tx_mock.assert_async().await;
	hash_mock.assert_async().await;
	events_mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_transaction_maps_to_not_found() {
	let mut server = mockito::Server::new_async().await;
	let _mock = mock_method(
		&mut server,
		"getrawtransaction",
		json!({
			"id": "1",
			"error": -5,
			"desc": "UNKNOWN TRANSACTION",
			"result": null,
		})
		.to_string(),
	)
	.await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	let err = client.get_transaction("gone").await.unwrap_err();

	assert!(err.is_not_found());
	assert!(matches!(err, ChainClientError::TransactionNotFound(_)));
}

#[tokio::test]
async fn test_other_node_errors_are_transient() {
	let mut server = mockito::Server::new_async().await;
	let _mock = mock_method(
		&mut server,
		"getblockhash",
		json!({
			"id": "1",
			"error": -1,
			"desc": "INVALID PARAMS",
			"result": null,
		})
		.to_string(),
	)
	.await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	let err = client.get_block_hash(1).await.unwrap_err();

	assert!(!err.is_not_found());
	assert!(matches!(err, ChainClientError::RequestError(_)));
}

#[tokio::test]
async fn test_http_error_status_is_a_request_error() {
	let mut server = mockito::Server::new_async().await;
	let _mock = server
		.mock("POST", "/")
		.with_status(503)
		.create_async()
		.await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	let err = client.get_block_height().await.unwrap_err();

	assert!(matches!(err, ChainClientError::RequestError(_)));
}

#[tokio::test]
async fn test_get_mempool_tx_ids() {
	let mut server = mockito::Server::new_async().await;
	let mock = mock_method(
		&mut server,
		"getrawmempool",
		rpc_result(json!(["txa", "txb"])),
	)
	.await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	assert_eq!(
		client.get_mempool_tx_ids().await.unwrap(),
		vec!["txa", "txb"]
	);

	mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_mempool() {
	let mut server = mockito::Server::new_async().await;
	let _mock = mock_method(&mut server, "getrawmempool", rpc_result(json!(null))).await;

	let client = HttpChainClient::new(&server.url(), None, &no_retry()).unwrap();
	assert!(client.get_mempool_tx_ids().await.unwrap().is_empty());
}
