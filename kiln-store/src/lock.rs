//! Advisory locks
//!
//! A lock is a sentinel key created with compare-and-swap. Its value is
//! `{token}:{expires_unix_ns}`: the token identifies the holder, the expiry lets
//! another caller take over a lock whose holder died without releasing it.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::metadata::MetadataStore;

/// Acquires advisory locks on metadata store keys
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn MetadataStore>,
    ttl: Duration,
    acquire_timeout: Duration,
    retry_interval: Duration,
}

impl LockManager {
    /// Creates a lock manager with a lock lifetime of `ttl`
    pub fn new(store: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            acquire_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(25),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Acquires the lock at `key`, waiting while another holder owns it.
    ///
    /// Fails with `StoreError::LockTimeout` once `acquire_timeout` has passed.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard> {
        let token = Uuid::new_v4();
        let deadline = Instant::now() + self.acquire_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let value = format!("{}:{}", token, expiry_after(self.ttl));
            if self.try_acquire(key, &value).await? {
                if attempts > 1 {
                    debug!("Acquired lock {} after {} attempt(s)", key, attempts);
                }
                return Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    key: key.to_string(),
                    value,
                });
            }

            if Instant::now() >= deadline {
                return Err(StoreError::LockTimeout {
                    key: key.to_string(),
                    after: self.acquire_timeout,
                });
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn try_acquire(&self, key: &str, value: &str) -> Result<bool> {
        if self.store.compare_and_swap(key, None, value).await? {
            return Ok(true);
        }

        let current = match self.store.get(key).await {
            Ok(current) => current,
            // Released between the two calls; the next attempt may win.
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };

        if is_expired(&current, now_nanos()) {
            warn!("Taking over expired lock {} ({})", key, current);
            return self.store.compare_and_swap(key, Some(&current), value).await;
        }
        Ok(false)
    }
}

/// A held advisory lock
///
/// Release is explicit because it needs a store round trip; a guard that is
/// dropped without release expires after the manager's TTL.
#[must_use = "a lock guard must be released"]
pub struct LockGuard {
    store: Arc<dyn MetadataStore>,
    key: String,
    value: String,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock if this guard still owns it.
    pub async fn release(self) -> Result<()> {
        if !self.store.compare_and_delete(&self.key, &self.value).await? {
            warn!("Lock {} was taken over before release", self.key);
        }
        Ok(())
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn expiry_after(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now_nanos().saturating_add(ttl)
}

/// Unreadable lock values count as expired.
fn is_expired(value: &str, now: i64) -> bool {
    value
        .rsplit_once(':')
        .and_then(|(_, expiry)| expiry.parse::<i64>().ok())
        .is_none_or(|expiry| expiry <= now)
}
