use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::api::StateService;
use super::cache::StateCache;
use super::classifier::classify;
use super::models::{Account, NetworkState, RemoteState, RemoteStatePatch};
use super::registry::{AccountRegistry, Accounts};
use super::scheduler::{BulkRefreshOutcome, BulkRefreshScheduler, RefreshPlan, DEFAULT_RECENCY_THRESHOLD};
use super::validation::validate_authorization;
use crate::error::{ApiError, StoreError, ValidationError};
use crate::storage::KeyValueStore;

/// Why the server refused a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// HTTP 401
    WrongPassword,
    /// HTTP 404, the computer is unknown to the server
    UnknownAccount,
}

impl AuthRejection {
    fn from_error(error: &ApiError) -> Option<Self> {
        match error.status() {
            Some(401) => Some(AuthRejection::WrongPassword),
            Some(404) => Some(AuthRejection::UnknownAccount),
            _ => None,
        }
    }
}

/// Result of [`SyncEngine::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Registered and fetched.
    Authorized(RemoteState),
    /// The server refused the password. Nothing was stored.
    Rejected(AuthRejection),
    /// Refused locally before contacting the server.
    Invalid(ValidationError),
    /// No usable answer. If the account was registered but its first fetch failed,
    /// it stays registered and a plain fetch should be retried.
    Failed,
}

/// Keeps the local account registry and state cache in step with the server.
///
/// The engine is the only component that talks to the [`StateService`] and the only
/// one that changes account health. Collaborator errors never escape its
/// operations: callers get a typed result and read the account's network state.
pub struct SyncEngine {
    registry: AccountRegistry,
    cache: StateCache,
    service: Arc<dyn StateService>,
    scheduler: BulkRefreshScheduler,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, service: Arc<dyn StateService>) -> Self {
        Self::with_recency_threshold(store, service, DEFAULT_RECENCY_THRESHOLD)
    }

    pub fn with_recency_threshold(
        store: Arc<dyn KeyValueStore>,
        service: Arc<dyn StateService>,
        recency_threshold: Duration,
    ) -> Self {
        Self {
            registry: AccountRegistry::new(store.clone()),
            cache: StateCache::new(store),
            service,
            scheduler: BulkRefreshScheduler::new(recency_threshold),
        }
    }

    /// Restore accounts and their cached states from the store.
    pub async fn load(&self, cold_start: bool) -> Result<usize, StoreError> {
        let count = self.registry.load(cold_start).await?;
        let accounts = self.registry.snapshot().await;
        let hydrated = self.cache.hydrate(accounts.keys()).await;
        debug!("Hydrated {} of {} cached state(s)", hydrated, count);
        Ok(count)
    }

    /// Process start: cold load, then the one-time bulk refresh check.
    pub async fn start(&self) -> Result<BulkRefreshOutcome, StoreError> {
        self.load(true).await?;
        Ok(self.accounts_changed().await)
    }

    pub async fn account(&self, id: &str) -> Option<Account> {
        self.registry.get(id).await
    }

    pub async fn accounts(&self) -> Accounts {
        self.registry.snapshot().await
    }

    pub async fn state(&self, id: &str) -> Option<RemoteState> {
        self.cache.get(id).await
    }

    pub fn scheduler(&self) -> &BulkRefreshScheduler {
        &self.scheduler
    }

    /// Exchange a parent password for an auth key, register the account and fetch
    /// its first state. Also used to sign an `Unauthorized` account back in.
    pub async fn authorize(&self, id: &str, name: &str, password: &str) -> AuthorizeOutcome {
        let name = name.trim();
        let accounts = self.registry.snapshot().await;
        if let Err(e) = validate_authorization(&accounts, id, name, password) {
            warn!("Refusing to authorize {}: {}", id, e);
            return AuthorizeOutcome::Invalid(e);
        }

        let response = match self.service.authorize(id, password).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(rejection) = AuthRejection::from_error(&e) {
                    warn!("Authorization for {} rejected: {}", id, e);
                    return AuthorizeOutcome::Rejected(rejection);
                }
                error!("Authorization for {} failed: {}", id, e);
                return AuthorizeOutcome::Failed;
            }
        };

        if !response.success || response.auth_key.is_empty() {
            warn!("Server did not issue an auth key for {}", id);
            return AuthorizeOutcome::Failed;
        }

        let mut account = Account::new(name, response.auth_key.clone());
        if let Some(existing) = accounts.get(id) {
            account.last_sync = existing.last_sync;
            info!("Re-authorized account {} ({})", name, id);
        } else {
            info!("Authorized new account {} ({})", name, id);
        }

        if let Err(e) = self.registry.upsert(id, account).await {
            error!("Failed to store account {}: {}", id, e);
            return AuthorizeOutcome::Failed;
        }

        let outcome = match self.fetch(id, &response.auth_key).await {
            Some(state) => AuthorizeOutcome::Authorized(state),
            None => {
                warn!("Account {} registered but its first fetch failed", id);
                AuthorizeOutcome::Failed
            }
        };

        self.accounts_changed().await;
        outcome
    }

    /// Replace the cached state with the server's.
    pub async fn fetch(&self, id: &str, token: &str) -> Option<RemoteState> {
        let state = match self.service.fetch_state(id, token).await {
            Ok(state) => state,
            Err(e) => {
                self.record_failure(id, "fetch", &e).await;
                return None;
            }
        };

        if !self.registry.contains(id).await {
            warn!("Discarding fetched state for unregistered account {}", id);
            return None;
        }

        if let Err(e) = self.cache.upsert(id, state.clone()).await {
            error!("Failed to cache state for {}: {}", id, e);
            return None;
        }

        self.set_network_state(id, NetworkState::Active).await;
        debug!("Fetched state for {}", id);
        Some(state)
    }

    /// Fetch using the account's stored token.
    pub async fn refresh(&self, id: &str) -> Option<RemoteState> {
        let Some(account) = self.registry.get(id).await else {
            warn!("Cannot refresh unknown account {}", id);
            return None;
        };
        self.fetch(id, &account.auth_key).await
    }

    /// Submit a partial state. When accepted, the cache becomes the prior state
    /// overlaid with the submission, overlaid with the server's delta.
    pub async fn push(&self, id: &str, patch: &RemoteStatePatch, token: &str) -> bool {
        let response = match self.service.sync_state(id, patch, true, token).await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(id, "push", &e).await;
                return false;
            }
        };

        if !response.accepted {
            info!("Server declined pushed state for {}", id);
            return false;
        }

        let delta = response.delta.as_ref();
        let next = match self.cache.get(id).await {
            Some(current) => Some(current.merged(patch, delta)),
            None => {
                let combined = match delta {
                    Some(delta) => patch.overlay(delta),
                    None => patch.clone(),
                };
                combined.into_complete()
            }
        };

        match next {
            Some(next) if self.registry.contains(id).await => {
                if let Err(e) = self.cache.upsert(id, next).await {
                    error!("Failed to cache pushed state for {}: {}", id, e);
                    return false;
                }
            }
            Some(_) => warn!("Discarding pushed state for unregistered account {}", id),
            None => debug!("No cached state for {} to merge the push into", id),
        }

        self.set_network_state(id, NetworkState::Active).await;
        debug!("Pushed state for {}", id);
        true
    }

    /// Forget an account and its cached state. The server is not contacted.
    pub async fn remove(&self, id: &str) {
        match self.registry.remove(id).await {
            Ok(true) => {}
            Ok(false) => debug!("Remove requested for unknown account {}", id),
            Err(e) => {
                error!("Failed to remove account {}: {}", id, e);
                return;
            }
        }

        if let Err(e) = self.cache.remove(id).await {
            error!("Failed to remove cached state for {}: {}", id, e);
        }

        self.accounts_changed().await;
    }

    /// Re-evaluate the startup refresh after the account set changed. Only the
    /// first evaluation with a non-empty set can fetch anything.
    pub async fn accounts_changed(&self) -> BulkRefreshOutcome {
        let accounts = self.registry.snapshot().await;
        match self.scheduler.plan(&accounts, Utc::now().timestamp_millis()) {
            RefreshPlan::NoAccounts => BulkRefreshOutcome::NoAccounts,
            RefreshPlan::AlreadyRan => BulkRefreshOutcome::AlreadyRan,
            RefreshPlan::Fresh => BulkRefreshOutcome::Skipped,
            RefreshPlan::Refresh(targets) => {
                info!("Refreshing {} account(s)", targets.len());
                let results = join_all(
                    targets
                        .iter()
                        .map(|(id, token)| self.fetch(id, token)),
                )
                .await;

                let succeeded = results.iter().filter(|state| state.is_some()).count();
                let failed = results.len() - succeeded;
                if failed > 0 {
                    warn!("Bulk refresh: {} succeeded, {} failed", succeeded, failed);
                } else {
                    info!("Bulk refresh: {} account(s) up to date", succeeded);
                }
                BulkRefreshOutcome::Refreshed { succeeded, failed }
            }
        }
    }

    async fn record_failure(&self, id: &str, operation: &str, error: &ApiError) {
        let state = classify(error);
        warn!("{} for {} failed ({}): {}", operation, id, state, error);
        self.set_network_state(id, state).await;
    }

    async fn set_network_state(&self, id: &str, state: NetworkState) {
        match self.registry.set_network_state(id, state).await {
            Ok(true) => {}
            Ok(false) => debug!("No account {} to mark {}", id, state),
            Err(e) => error!("Failed to record network state for {}: {}", id, e),
        }
    }
}
