use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::models::RemoteState;
use crate::error::StoreError;
use crate::storage::KeyValueStore;

/// Store key of the cached state for one account.
pub fn state_key(id: &str) -> String {
    format!("uuid-{}", id)
}

/// Last known remote state per account, one store entry per account.
pub struct StateCache {
    store: Arc<dyn KeyValueStore>,
    states: RwLock<HashMap<String, RemoteState>>,
}

impl StateCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Load the cached states of the given accounts from the store. Missing or
    /// unreadable entries are skipped. Returns how many were restored.
    pub async fn hydrate<'a, I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut restored = HashMap::new();
        for id in ids {
            match self.store.get(&state_key(id)).await {
                Ok(Some(raw)) => match serde_json::from_str::<RemoteState>(&raw) {
                    Ok(state) => {
                        restored.insert(id.clone(), state);
                    }
                    Err(e) => warn!("Discarding unreadable cached state for {}: {}", id, e),
                },
                Ok(None) => debug!("No cached state for {}", id),
                Err(e) => warn!("Failed to read cached state for {}: {}", id, e),
            }
        }

        let count = restored.len();
        self.states.write().await.extend(restored);
        count
    }

    pub async fn get(&self, id: &str) -> Option<RemoteState> {
        self.states.read().await.get(id).cloned()
    }

    /// Replace the cached state of an account.
    pub async fn upsert(&self, id: &str, state: RemoteState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&state)?;
        let mut guard = self.states.write().await;
        self.store.set(&state_key(id), &raw).await?;
        guard.insert(id.to_string(), state);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.states.write().await;
        self.store.remove(&state_key(id)).await?;
        guard.remove(id);
        Ok(())
    }
}
