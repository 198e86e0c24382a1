//! Storage layer for the agora pipeline.
//!
//! The pipeline talks to persistence through the [`Store`] and
//! [`SettingsReader`] traits. Two implementations are provided:
//! - [`RocksStore`]: RocksDB-backed, column family per record type, counters
//!   kept as merge-operator deltas so concurrent runs never lose increments
//! - [`MemoryStore`]: in-process store with failure injection for tests

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use db::RocksStore;
pub use error::StorageError;
pub use memory::{MemoryStore, StoreOp};
pub use store::{SettingsReader, Store, StoreStats, THROTTLE_SETTING_KEY};
