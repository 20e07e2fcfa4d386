#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use autologout_sync::error::{ApiError, StoreError};
use autologout_sync::sync::models::{AuthorizeResponse, SyncResponse};
use autologout_sync::sync::registry::{Accounts, ACCOUNTS_KEY};
use autologout_sync::{
    Account, KeyValueStore, MemoryStore, RemoteState, RemoteStatePatch, StateService, SyncEngine,
};

pub const BOB_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const ALICE_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const CAROL_ID: &str = "33333333-3333-3333-3333-333333333333";
pub const DAVE_ID: &str = "44444444-4444-4444-4444-444444444444";

/// Scripted reply of the fake server.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Status(u16),
    Transport,
}

impl<T: Clone> Reply<T> {
    fn produce(&self) -> Result<T, ApiError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Status(status) => Err(ApiError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            Reply::Transport => Err(ApiError::Transport("connection reset".to_string())),
        }
    }
}

/// A pushed request as the fake server saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    pub id: String,
    pub patch: RemoteStatePatch,
    pub parent_mode: bool,
    pub token: String,
}

/// In-process stand-in for the AutoLogout server. Unscripted calls fail at the
/// transport level.
#[derive(Default)]
pub struct FakeStateService {
    fetch_replies: Mutex<HashMap<String, Reply<RemoteState>>>,
    auth_replies: Mutex<HashMap<String, Reply<AuthorizeResponse>>>,
    sync_replies: Mutex<HashMap<String, Reply<SyncResponse>>>,
    fetches: Mutex<Vec<(String, String)>>,
    authorizations: Mutex<Vec<(String, String)>>,
    pushes: Mutex<Vec<PushRecord>>,
}

impl FakeStateService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_fetch(&self, id: &str, reply: Reply<RemoteState>) {
        self.fetch_replies.lock().unwrap().insert(id.to_string(), reply);
    }

    pub fn on_authorize(&self, id: &str, reply: Reply<AuthorizeResponse>) {
        self.auth_replies.lock().unwrap().insert(id.to_string(), reply);
    }

    /// Accept `password` for `id`, issuing `token`; anything else gets a 401.
    pub fn accept_password(&self, id: &str, token: &str) {
        self.on_authorize(
            id,
            Reply::Ok(AuthorizeResponse {
                success: true,
                auth_key: token.to_string(),
            }),
        );
    }

    pub fn on_sync(&self, id: &str, reply: Reply<SyncResponse>) {
        self.sync_replies.lock().unwrap().insert(id.to_string(), reply);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetches(&self) -> Vec<(String, String)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn authorize_count(&self) -> usize {
        self.authorizations.lock().unwrap().len()
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.fetch_count() + self.authorize_count() + self.pushes().len()
    }
}

#[async_trait]
impl StateService for FakeStateService {
    async fn fetch_state(&self, id: &str, token: &str) -> Result<RemoteState, ApiError> {
        self.fetches
            .lock()
            .unwrap()
            .push((id.to_string(), token.to_string()));
        let reply = self.fetch_replies.lock().unwrap().get(id).cloned();
        reply.unwrap_or(Reply::Transport).produce()
    }

    async fn authorize(&self, id: &str, password: &str) -> Result<AuthorizeResponse, ApiError> {
        self.authorizations
            .lock()
            .unwrap()
            .push((id.to_string(), password.to_string()));
        let reply = self.auth_replies.lock().unwrap().get(id).cloned();
        reply.unwrap_or(Reply::Transport).produce()
    }

    async fn sync_state(
        &self,
        id: &str,
        patch: &RemoteStatePatch,
        parent_mode: bool,
        token: &str,
    ) -> Result<SyncResponse, ApiError> {
        self.pushes.lock().unwrap().push(PushRecord {
            id: id.to_string(),
            patch: patch.clone(),
            parent_mode,
            token: token.to_string(),
        });
        let reply = self.sync_replies.lock().unwrap().get(id).cloned();
        reply.unwrap_or(Reply::Transport).produce()
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.remove(key).await
    }
}

/// The state from the "Bob" walkthrough.
pub fn bob_state() -> RemoteState {
    RemoteState {
        daily_time_limit: 7200,
        today_time_limit: 3600,
        used_time: 1200,
        usage_date: "2024-01-01".to_string(),
        bedtime: "22:00:00".to_string(),
        waketime: "07:00:00".to_string(),
        grace_given: false,
        sync_author: None,
    }
}

pub fn unlimited_state(usage_date: &str) -> RemoteState {
    RemoteState {
        daily_time_limit: -1,
        today_time_limit: -1,
        used_time: 0,
        usage_date: usage_date.to_string(),
        bedtime: "00:00:00".to_string(),
        waketime: "00:00:00".to_string(),
        grace_given: false,
        sync_author: None,
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Write a registry straight into a store, as a previous session would have left it.
pub async fn seed_accounts(store: &dyn KeyValueStore, accounts: &[(&str, &str, i64)]) {
    let map: Accounts = accounts
        .iter()
        .map(|(id, name, last_sync)| {
            let mut account = Account::new(*name, format!("tok-{}", name.to_lowercase()));
            account.last_sync = *last_sync;
            (id.to_string(), account)
        })
        .collect();
    store
        .set(ACCOUNTS_KEY, &serde_json::to_string(&map).unwrap())
        .await
        .unwrap();
}

/// Engine with "Bob" authorized and fetched.
pub async fn engine_with_bob() -> (SyncEngine, Arc<FakeStateService>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = FakeStateService::new();
    service.accept_password(BOB_ID, "tok-abc");
    service.on_fetch(BOB_ID, Reply::Ok(bob_state()));

    let engine = SyncEngine::new(store.clone(), service.clone());
    let outcome = engine.authorize(BOB_ID, "Bob", "hunter2").await;
    assert_eq!(outcome, autologout_sync::AuthorizeOutcome::Authorized(bob_state()));

    (engine, service, store)
}
