//! Core services implementing the business logic.
//!
//! This module contains the main service implementations:
//! - `blockchain`: Chain client interface and JSON-RPC implementation
//! - `notification`: Scan event publishing to registered observers
//! - `scanner`: Block scanning, fork handling and transaction extraction

pub mod blockchain;
pub mod notification;
pub mod scanner;
