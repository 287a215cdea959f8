//! Chain node access.
//!
//! This module provides the read-only interface the scanner consumes from a
//! chain node and its JSON-RPC implementation.

mod client;
mod error;
mod rpc;

pub use client::ChainClient;
pub use error::{ChainClientError, TX_NOT_FOUND_PREFIX};
pub use rpc::HttpChainClient;
