//! Blockchain wallet scanning service.
//!
//! This library provides the block scanning engine of a wallet adapter: it
//! polls a chain node for new blocks, detects fork/reorg events, extracts
//! wallet-relevant transfers with a bounded-concurrency pipeline, durably
//! advances a scan checkpoint, and records extraction failures for retry.
//!
//! # Module Structure
//!
//! - `bootstrap`: Bootstraps the application
//! - `models`: Data structures for configuration and chain data
//! - `repositories`: Durable checkpoint storage
//! - `services`: Core business logic and chain interaction
//! - `utils`: Common utilities and helper functions

pub mod bootstrap;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;
