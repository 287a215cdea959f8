//! Repository implementations for durable scan state.
//!
//! This module provides the storage seam the scan loop persists its
//! progress through:
//!
//! - Checkpoint: the scan cursor, unscanned records awaiting retry, and a
//!   local block cache, stored as JSON files per chain symbol

mod checkpoint;
mod error;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use error::RepositoryError;
