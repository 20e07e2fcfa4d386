use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::models::{Account, NetworkState};
use crate::error::StoreError;
use crate::storage::KeyValueStore;

/// Store key holding the JSON map of every registered account.
pub const ACCOUNTS_KEY: &str = "accounts";

pub type Accounts = BTreeMap<String, Account>;

/// Registered accounts, mirrored in memory and persisted as one JSON map.
///
/// Every mutation builds the next map, writes it to the store and only then
/// publishes it, so memory is never ahead of disk.
pub struct AccountRegistry {
    store: Arc<dyn KeyValueStore>,
    accounts: RwLock<Accounts>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            accounts: RwLock::new(Accounts::new()),
        }
    }

    /// Restore accounts from the store. On a cold start the previous session's
    /// health is discarded and every account starts out `Unknown`.
    pub async fn load(&self, cold_start: bool) -> Result<usize, StoreError> {
        let mut accounts: Accounts = match self.store.get(ACCOUNTS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Accounts::new(),
        };

        let mut guard = self.accounts.write().await;
        if cold_start && !accounts.is_empty() {
            for account in accounts.values_mut() {
                account.state = NetworkState::Unknown;
            }
            self.persist(&accounts).await?;
        }

        let count = accounts.len();
        *guard = accounts;
        info!("Loaded {} account(s) (cold start: {})", count, cold_start);
        Ok(count)
    }

    pub async fn get(&self, id: &str) -> Option<Account> {
        self.accounts.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.accounts.read().await.contains_key(id)
    }

    pub async fn snapshot(&self) -> Accounts {
        self.accounts.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Insert or replace an account.
    pub async fn upsert(&self, id: &str, account: Account) -> Result<(), StoreError> {
        let mut guard = self.accounts.write().await;
        let mut next = guard.clone();
        next.insert(id.to_string(), account);
        self.persist(&next).await?;
        *guard = next;
        debug!("Stored account {}", id);
        Ok(())
    }

    /// Update an account's health. `Active` stamps the current time as last sync.
    /// Returns `false` when the account is not registered.
    pub async fn set_network_state(&self, id: &str, state: NetworkState) -> Result<bool, StoreError> {
        let mut guard = self.accounts.write().await;
        let Some(current) = guard.get(id) else {
            return Ok(false);
        };

        let mut updated = current.clone();
        updated.state = state;
        if state == NetworkState::Active {
            updated.last_sync = Utc::now().timestamp_millis();
        }

        let mut next = guard.clone();
        next.insert(id.to_string(), updated);
        self.persist(&next).await?;
        *guard = next;
        Ok(true)
    }

    /// Remove an account. Returns `false` when it was not registered.
    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.accounts.write().await;
        if !guard.contains_key(id) {
            return Ok(false);
        }

        let mut next = guard.clone();
        next.remove(id);
        self.persist(&next).await?;
        *guard = next;
        info!("Removed account {}", id);
        Ok(true)
    }

    /// Oldest last-sync timestamp across all accounts, `None` when there are none.
    pub async fn oldest_sync(&self) -> Option<i64> {
        self.accounts
            .read()
            .await
            .values()
            .map(|account| account.last_sync)
            .min()
    }

    async fn persist(&self, accounts: &Accounts) -> Result<(), StoreError> {
        let raw = serde_json::to_string(accounts)?;
        self.store.set(ACCOUNTS_KEY, &raw).await
    }
}
