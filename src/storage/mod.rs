pub mod database;
pub mod store;

pub use database::SqliteStore;
pub use store::{KeyValueStore, MemoryStore};
