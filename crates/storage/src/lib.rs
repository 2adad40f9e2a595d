//! Storage abstraction and implementations for Unblock.
//!
//! This crate provides a trait-based storage interface with a JSON-file
//! implementation and an in-memory one for tests and dry runs.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory_storage;

pub use trait_::{Storage, StorageError, Result};
pub use json_storage::JsonStorage;
pub use memory_storage::MemoryStorage;
