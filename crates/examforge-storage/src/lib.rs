//! examforge-storage: Persistence backends.
//!
//! Implements the `SnapshotStore` trait for a remote HTTP key/value service,
//! a durable local directory and an in-memory mock, and builds the tiered
//! `PersistenceLayer` from configuration.

pub mod config;
pub mod local;
pub mod mock;
pub mod remote;

pub use config::{
    create_persistence, load_config, load_config_from, ExamforgeConfig, StorageConfig, StorageMode,
};
pub use local::LocalStore;
pub use mock::MemoryStore;
pub use remote::RemoteStore;
