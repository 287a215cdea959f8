//! Utility modules for common functionality.
//!
//! This module provides various utility functions and types that are used across
//! the application. Currently includes:
//!
//! - http: HTTP client utilities (creation of retryable HTTP clients)
//! - logging: Logging utilities
//! - parsing: Parsing utilities

pub mod http;
pub mod logging;
pub mod parsing;

pub use http::*;
pub use parsing::*;
