//! JSON-RPC chain client implementation.
//!
//! Talks the node's JSON-RPC dialect (`getblockcount`, `getblockhash`,
//! `getblock`, `getrawtransaction`, `getsmartcodeevent`, `getrawmempool`)
//! over a retrying HTTP client. Transfer events are decoded from the
//! contract event log attached to each transaction; events whose recipient
//! is the configured fee-collection address are flagged as fee payments.

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{json, Value};
use std::{collections::HashMap, time::Duration};
use url::Url;

use crate::{
	models::{Block, Transaction, Transfer},
	services::blockchain::{client::ChainClient, error::ChainClientError},
	utils::http::{create_retryable_http_client, RetryConfig},
};

/// Node error code for a transaction the node has no information about.
const RPC_UNKNOWN_TRANSACTION: i64 = -5;

/// JSON-RPC client for a single node endpoint.
///
/// The client is thread-safe and can be shared across extraction workers.
#[derive(Clone, Debug)]
pub struct HttpChainClient {
	/// Retryable HTTP client for making requests
	client: ClientWithMiddleware,
	/// Node endpoint
	url: Url,
	/// Address fee transfers are paid to
	fee_collection_address: Option<String>,
}

impl HttpChainClient {
	/// Creates a new JSON-RPC client for the given endpoint.
	pub fn new(
		rpc_url: &str,
		fee_collection_address: Option<String>,
		retry_config: &RetryConfig,
	) -> Result<Self, ChainClientError> {
		let url = Url::parse(rpc_url).map_err(|e| {
			ChainClientError::request_error(
				format!("Invalid RPC URL: {}", rpc_url),
				Some(Box::new(e)),
				None,
			)
		})?;

		let base_client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(32)
			.timeout(Duration::from_secs(30))
			.connect_timeout(Duration::from_secs(20))
			.build()
			.map_err(|e| {
				ChainClientError::request_error(
					"Failed to create HTTP client",
					Some(Box::new(e)),
					None,
				)
			})?;

		let client = create_retryable_http_client(
			retry_config,
			base_client,
			None::<reqwest_retry::DefaultRetryableStrategy>,
		);

		Ok(Self {
			client,
			url,
			fee_collection_address,
		})
	}

	/// Sends one JSON-RPC request and returns the `result` payload.
	async fn send_request(
		&self,
		method: &str,
		params: Vec<Value>,
	) -> Result<Value, ChainClientError> {
		let request = json!({
			"jsonrpc": "2.0",
			"id": "1",
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(self.url.clone())
			.json(&request)
			.send()
			.await
			.map_err(|e| {
				ChainClientError::request_error(
					format!("Failed to send {} request", method),
					Some(Box::new(e)),
					Some(HashMap::from([("method".to_string(), method.to_string())])),
				)
			})?;

		let status = response.status();
		if !status.is_success() {
			return Err(ChainClientError::request_error(
				format!("{} request failed with status {}", method, status.as_u16()),
				None,
				Some(HashMap::from([("method".to_string(), method.to_string())])),
			));
		}

		let body: Value = response.json().await.map_err(|e| {
			ChainClientError::response_parse_error(
				format!("Failed to decode {} response", method),
				Some(Box::new(e)),
				None,
			)
		})?;

		let code = body.get("error").and_then(Value::as_i64).unwrap_or(0);
		if code != 0 {
			let desc = body
				.get("desc")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string();

			if code == RPC_UNKNOWN_TRANSACTION {
				return Err(ChainClientError::transaction_not_found(
					format!("[{}]{}", code, desc),
					Some(HashMap::from([("method".to_string(), method.to_string())])),
				));
			}

			return Err(ChainClientError::request_error(
				format!("{} request failed with code {}: {}", method, code, desc),
				None,
				None,
			));
		}

		Ok(body.get("result").cloned().unwrap_or(Value::Null))
	}

	/// Fetches the contract event log of a transaction and decodes its
	/// transfer events.
	async fn get_transfer_events(&self, tx_id: &str) -> Result<Vec<Transfer>, ChainClientError> {
		let result = self
			.send_request("getsmartcodeevent", vec![json!(tx_id)])
			.await?;

		Ok(parse_transfers(
			&result,
			self.fee_collection_address.as_deref(),
		))
	}
}

#[async_trait]
impl ChainClient for HttpChainClient {
	async fn get_block_height(&self) -> Result<u64, ChainClientError> {
		let result = self.send_request("getblockcount", vec![]).await?;

		let count = value_as_u64(&result).ok_or_else(|| {
			ChainClientError::response_parse_error(
				format!("Unexpected getblockcount result: {}", result),
				None,
				None,
			)
		})?;

		// The node reports the block count; the tip is one below it
		Ok(count.saturating_sub(1))
	}

	async fn get_block_hash(&self, height: u64) -> Result<String, ChainClientError> {
		let result = self
			.send_request("getblockhash", vec![json!(height)])
			.await?;

		result
			.as_str()
			.map(|s| s.to_string())
			.ok_or_else(|| {
				ChainClientError::response_parse_error(
					format!("Unexpected getblockhash result: {}", result),
					None,
					None,
				)
			})
	}

	async fn get_block(&self, hash: &str) -> Result<Block, ChainClientError> {
		let result = self
			.send_request("getblock", vec![json!(hash), json!(1)])
			.await?;
		parse_block(&result)
	}

	async fn get_block_by_height(&self, height: u64) -> Result<Block, ChainClientError> {
		let result = self
			.send_request("getblock", vec![json!(height), json!(1)])
			.await?;
		parse_block(&result)
	}

	async fn get_transaction(&self, tx_id: &str) -> Result<Transaction, ChainClientError> {
		let result = self
			.send_request("getrawtransaction", vec![json!(tx_id), json!(1)])
			.await?;

		let block_height = result.get("Height").and_then(value_as_u64).unwrap_or(0);

		// Unconfirmed transactions have no containing block yet
		let block_hash = if block_height > 0 {
			self.get_block_hash(block_height).await?
		} else {
			String::new()
		};

		let transfers = self.get_transfer_events(tx_id).await?;

		Ok(Transaction {
			tx_id: tx_id.to_string(),
			block_height,
			block_hash,
			transfers,
		})
	}

	async fn get_mempool_tx_ids(&self) -> Result<Vec<String>, ChainClientError> {
		let result = self.send_request("getrawmempool", vec![]).await?;

		match result {
			Value::Null => Ok(Vec::new()),
			Value::Array(items) => Ok(items
				.iter()
				.filter_map(|v| v.as_str().map(|s| s.to_string()))
				.collect()),
			other => Err(ChainClientError::response_parse_error(
				format!("Unexpected getrawmempool result: {}", other),
				None,
				None,
			)),
		}
	}
}

/// Reads a numeric field that nodes serialize either as a number or a string.
fn value_as_u64(value: &Value) -> Option<u64> {
	match value {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.parse().ok(),
		_ => None,
	}
}

/// Decodes a verbose `getblock` result into a [`Block`].
fn parse_block(value: &Value) -> Result<Block, ChainClientError> {
	let hash = value
		.get("Hash")
		.and_then(Value::as_str)
		.map(|s| s.to_string());
	let header = value.get("Header");
	let height = header
		.and_then(|h| h.get("Height"))
		.and_then(value_as_u64);
	let prev_hash = header
		.and_then(|h| h.get("PrevBlockHash"))
		.and_then(Value::as_str)
		.map(|s| s.to_string());

	let (hash, height, prev_hash) = match (hash, height, prev_hash) {
		(Some(hash), Some(height), Some(prev_hash)) => (hash, height, prev_hash),
		_ => {
			return Err(ChainClientError::response_parse_error(
				format!("Unexpected getblock result: {}", value),
				None,
				None,
			))
		}
	};

	let transactions = value
		.get("Transactions")
		.and_then(Value::as_array)
		.map(|txs| {
			txs.iter()
				.filter_map(|tx| tx.get("Hash").and_then(Value::as_str))
				.map(|s| s.to_string())
				.collect()
		})
		.unwrap_or_default();

	Ok(Block {
		height,
		hash,
		prev_hash,
		transactions,
	})
}

/// Decodes the `Notify` entries of a `getsmartcodeevent` result into
/// transfer events.
///
/// Only `transfer` events are kept; an event paying the fee-collection
/// address is flagged as a fee.
fn parse_transfers(value: &Value, fee_collection_address: Option<&str>) -> Vec<Transfer> {
	let notifies = match value.get("Notify").and_then(Value::as_array) {
		Some(notifies) => notifies,
		None => return Vec::new(),
	};

	let mut transfers = Vec::new();
	for notify in notifies {
		let contract_address = notify
			.get("ContractAddress")
			.and_then(Value::as_str)
			.unwrap_or_default();

		let states = match notify.get("States").and_then(Value::as_array) {
			Some(states) if states.len() == 4 => states,
			_ => continue,
		};

		let method = states[0].as_str().unwrap_or_default();
		if method != "transfer" {
			continue;
		}

		let to = value_as_string(&states[2]);
		let is_fee = fee_collection_address.is_some_and(|fee_addr| to == fee_addr);

		transfers.push(Transfer {
			from: value_as_string(&states[1]),
			to,
			contract_address: contract_address.to_string(),
			amount: value_as_string(&states[3]),
			is_fee,
		});
	}

	transfers
}

/// Reads a state entry that nodes serialize either as a string or a number.
fn value_as_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
