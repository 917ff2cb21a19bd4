//! Capabilities cache
//!
//! Process-wide, time-bounded cache of server capability flags with
//! single-flight fetch coalescing per account.
//!
//! ## State machine (per account)
//!
//! ```text
//! {no data} -> fetching -> fresh -> (interval elapses) -> stale -> fetching -> fresh ...
//! ```
//!
//! A second caller requesting capabilities while a fetch is ongoing for
//! the same account blocks cooperatively on the per-account slot mutex
//! until the fetch completes, then re-checks freshness instead of
//! triggering a redundant fetch. Holding the async mutex across the fetch
//! IS the single-flight barrier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use cumulo_core::domain::Account;
use cumulo_core::ports::{Capabilities, RemoteClient, RemoteError};

/// How long a fetched capability payload stays fresh
pub const CAPABILITIES_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached capability state for one account
#[derive(Default)]
struct Slot {
    caps: Option<Capabilities>,
    fetched_at: Option<Instant>,
}

impl Slot {
    fn fresh(&self, ttl: Duration) -> Option<&Capabilities> {
        match (&self.caps, self.fetched_at) {
            (Some(caps), Some(at)) if at.elapsed() < ttl => Some(caps),
            _ => None,
        }
    }
}

/// Process-wide capability cache, one slot per account
pub struct CapabilityCache {
    slots: DashMap<String, Arc<Mutex<Slot>>>,
    ttl: Duration,
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityCache {
    /// Creates a cache with the standard freshness interval
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            ttl: CAPABILITIES_TTL,
        }
    }

    /// Creates a cache with a custom freshness interval (tests)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    fn slot(&self, account: &Account) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(account.id())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Returns current capabilities for `account`, fetching at most once
    ///
    /// Fresh cached data is returned without contacting the server.
    /// Concurrent callers on a stale slot coalesce onto one fetch.
    pub async fn capabilities_for(
        &self,
        account: &Account,
        remote: &dyn RemoteClient,
    ) -> Result<Capabilities, RemoteError> {
        let slot = self.slot(account);
        let mut guard = slot.lock().await;

        // Re-check after acquiring: a coalesced fetch may have refreshed
        // the slot while this caller waited.
        if let Some(caps) = guard.fresh(self.ttl) {
            debug!(account = %account.id(), "Capabilities served from cache");
            return Ok(caps.clone());
        }

        debug!(account = %account.id(), "Fetching capabilities");
        let caps = remote.capabilities().await?;
        guard.caps = Some(caps.clone());
        guard.fetched_at = Some(Instant::now());
        Ok(caps)
    }

    /// Whether the server supports trashing for `account`
    ///
    /// Derived from the undelete capability flag; any fetch error or
    /// missing section yields false (fail closed).
    pub async fn supports_trash(&self, account: &Account, remote: &dyn RemoteClient) -> bool {
        match self.capabilities_for(account, remote).await {
            Ok(caps) => caps.supports_trash(),
            Err(e) => {
                warn!(account = %account.id(), error = %e, "Capability fetch failed, assuming no trash support");
                false
            }
        }
    }

    /// Drops the cached payload for one account
    pub fn invalidate(&self, account: &Account) {
        self.slots.remove(&account.id());
    }

    /// Drops every cached payload
    pub fn clear(&self) {
        self.slots.clear();
    }

    #[cfg(test)]
    async fn backdate(&self, account: &Account, age: Duration) {
        let slot = self.slot(account);
        let mut guard = slot.lock().await;
        guard.fetched_at = Instant::now().checked_sub(age);
    }
}
