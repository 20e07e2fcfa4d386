//! Synchronization engine for AutoLogout Manager.
//!
//! Keeps a local cache of each managed computer's time limits and downtime in step
//! with the AutoLogout server, across several accounts and unreliable connectivity.

pub mod config;
pub mod error;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use error::{ApiError, StoreError, ValidationError};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{
    Account, AuthRejection, AuthorizeOutcome, BulkRefreshOutcome, HttpStateApi, NetworkState,
    RemoteState, RemoteStatePatch, StateService, SyncEngine,
};
