//! Short-lived pairing keys for machine enrollment.
//!
//! A user asks the hub for a key, hands it to the reporter being installed,
//! and the reporter redeems it to prove who it should belong to. Keys live
//! for a fixed TTL and are removed by a deferred task scheduled at issue
//! time, not by check-on-read timestamp comparison. Redeeming does not
//! consume a key: it stays valid for the rest of its window.

use dashmap::DashMap;
use pulse_common::UserId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// A freshly issued pairing key and its absolute expiry time.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    /// The key text: 32 uppercase hex characters.
    pub key: String,
    /// When the key stops being redeemable.
    pub expires_at: SystemTime,
}

#[derive(Debug)]
struct KeyEntry {
    owner: UserId,
    /// Issue sequence number; guards the expiry task against removing a
    /// later entry that reused the same key text.
    id: u64,
    expiry_task: AbortHandle,
}

#[derive(Debug)]
struct Inner {
    entries: DashMap<String, KeyEntry>,
    ttl: Duration,
    next_id: AtomicU64,
}

/// Store of live pairing keys, keyed by normalized key text.
///
/// Cheap to clone; all clones share the same table. Expiry tasks hold only
/// a weak reference, so dropping the last store handle lets pending timers
/// fire into nothing.
#[derive(Debug, Clone)]
pub struct PairingKeys {
    inner: Arc<Inner>,
}

impl PairingKeys {
    /// Create a store whose keys live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                ttl,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Issue a fresh key bound to `owner` and schedule its removal.
    ///
    /// Must be called within a tokio runtime.
    pub fn issue(&self, owner: &str) -> IssuedKey {
        let key = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let expires_at = SystemTime::now() + self.inner.ttl;

        let weak = Arc::downgrade(&self.inner);
        let task_key = key.clone();
        // Anchor the removal deadline at issue time, not at the expiry
        // task's first poll.
        let deadline = tokio::time::Instant::now() + self.inner.ttl;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                let removed = inner.entries.remove_if(&task_key, |_k, entry| entry.id == id);
                if removed.is_some() {
                    tracing::debug!(key = %task_key, "pairing key expired");
                    crate::metrics::counters::pairing_keys_expired();
                }
            }
        });

        let entry = KeyEntry {
            owner: owner.to_string(),
            id,
            expiry_task: task.abort_handle(),
        };
        if let Some(prev) = self.inner.entries.insert(key.clone(), entry) {
            prev.expiry_task.abort();
        }

        IssuedKey { key, expires_at }
    }

    /// Look up the owner of a candidate key, case-insensitively.
    ///
    /// The entry is not removed: keys are multi-use until they expire or
    /// are revoked.
    #[must_use]
    pub fn redeem(&self, candidate: &str) -> Option<UserId> {
        let normalized = candidate.to_ascii_uppercase();
        self.inner
            .entries
            .get(&normalized)
            .map(|entry| entry.owner.clone())
    }

    /// Remove a key now and cancel its pending expiry task.
    ///
    /// Cancelling matters: a stale timer left running could race a later
    /// entry that reuses the same key text. Returns `true` if the key was
    /// present.
    pub fn revoke(&self, candidate: &str) -> bool {
        let normalized = candidate.to_ascii_uppercase();
        match self.inner.entries.remove(&normalized) {
            Some((_, entry)) => {
                entry.expiry_task.abort();
                true
            }
            None => false,
        }
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
