use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::registry::Accounts;

/// Default recency window inside which a startup refresh is skipped.
pub const DEFAULT_RECENCY_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// One-shot guard for the startup refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshLatch {
    NotYetRun,
    Ran,
}

/// What to do after the account set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPlan {
    /// No accounts yet; the latch stays open.
    NoAccounts,
    /// The one startup refresh already happened.
    AlreadyRan,
    /// Every account synced within the recency window.
    Fresh,
    /// Fetch these accounts, as `(id, token)` pairs.
    Refresh(Vec<(String, String)>),
}

/// Result of a bulk refresh check, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkRefreshOutcome {
    NoAccounts,
    AlreadyRan,
    Skipped,
    Refreshed { succeeded: usize, failed: usize },
}

/// Decides, at most once per process, whether every account should be refetched.
pub struct BulkRefreshScheduler {
    latch: Mutex<RefreshLatch>,
    recency_threshold: Duration,
}

impl BulkRefreshScheduler {
    pub fn new(recency_threshold: Duration) -> Self {
        Self {
            latch: Mutex::new(RefreshLatch::NotYetRun),
            recency_threshold,
        }
    }

    pub fn latch(&self) -> RefreshLatch {
        *self.latch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn recency_threshold(&self) -> Duration {
        self.recency_threshold
    }

    /// Evaluate the account set at `now_ms` (epoch milliseconds). The latch flips
    /// to `Ran` the first time the set is non-empty, whatever the plan.
    pub fn plan(&self, accounts: &Accounts, now_ms: i64) -> RefreshPlan {
        if accounts.is_empty() {
            return match self.latch() {
                RefreshLatch::NotYetRun => RefreshPlan::NoAccounts,
                RefreshLatch::Ran => RefreshPlan::AlreadyRan,
            };
        }

        {
            let mut latch = self.latch.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *latch == RefreshLatch::Ran {
                return RefreshPlan::AlreadyRan;
            }
            *latch = RefreshLatch::Ran;
        }

        let oldest = accounts.values().map(|a| a.last_sync).min().unwrap_or(0);
        if is_fresh(oldest, now_ms, self.recency_threshold) {
            info!(
                "All {} account(s) synced within {:?}, skipping startup refresh",
                accounts.len(),
                self.recency_threshold
            );
            return RefreshPlan::Fresh;
        }

        debug!("Oldest sync at {} ms, refreshing {} account(s)", oldest, accounts.len());
        RefreshPlan::Refresh(
            accounts
                .iter()
                .map(|(id, account)| (id.clone(), account.auth_key.clone()))
                .collect(),
        )
    }
}

impl Default for BulkRefreshScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RECENCY_THRESHOLD)
    }
}

/// Whether a sync at `last_sync_ms` is still inside the window ending at `now_ms`.
pub fn is_fresh(last_sync_ms: i64, now_ms: i64, threshold: Duration) -> bool {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    last_sync_ms > now_ms.saturating_sub(threshold_ms)
}
