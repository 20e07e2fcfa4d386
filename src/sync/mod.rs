pub mod api;
pub mod cache;
pub mod classifier;
pub mod engine;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod validation;

pub use api::{HttpStateApi, StateService};
pub use cache::StateCache;
pub use engine::{AuthRejection, AuthorizeOutcome, SyncEngine};
pub use models::{Account, NetworkState, RemoteState, RemoteStatePatch};
pub use registry::{AccountRegistry, Accounts};
pub use scheduler::{BulkRefreshOutcome, BulkRefreshScheduler, RefreshLatch};
