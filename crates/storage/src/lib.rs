//! Storage abstraction and implementations for Archon.
//!
//! This crate provides the persistence port the scheduling core talks to,
//! with an in-memory backend and a JSON file backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_storage;
pub mod shared;

pub use trait_::{Storage, StorageError, Result};
pub use memory::MemoryStorage;
pub use json_storage::JsonStorage;
pub use shared::SharedStorage;
