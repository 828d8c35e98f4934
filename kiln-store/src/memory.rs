//! In-memory stores
//!
//! Deterministic implementations of the store contracts. Besides serving as
//! local backends they expose fault injection hooks so tests can fail a single
//! write, delay a directory probe, or count how often a key was written.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::artifact::ArtifactStore;
use crate::error::{Result, StoreError};
use crate::metadata::{KeyValue, MetadataStore};
use crate::secret::SecretStore;

/// Metadata store operation a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    ListDir,
    DeleteTree,
    CompareAndSwap,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Put => "put",
            StoreOp::ListDir => "list_dir",
            StoreOp::DeleteTree => "delete_tree",
            StoreOp::CompareAndSwap => "compare_and_swap",
        }
    }
}

struct Fault {
    op: StoreOp,
    pattern: String,
}

#[derive(Default)]
struct MetadataState {
    data: BTreeMap<String, String>,
    faults: Vec<Fault>,
    writes: HashMap<String, usize>,
    list_delay: Option<Duration>,
}

impl MetadataState {
    fn check(&self, op: StoreOp, key: &str) -> Result<()> {
        let injected = self
            .faults
            .iter()
            .any(|fault| fault.op == op && key.contains(&fault.pattern));
        if injected {
            return Err(StoreError::unavailable(op.as_str(), key, "injected failure"));
        }
        Ok(())
    }

    fn record_write(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
        *self.writes.entry(key.to_string()).or_default() += 1;
    }
}

/// In-memory `MetadataStore`
#[derive(Default)]
pub struct MemoryMetadataStore {
    state: Mutex<MetadataState>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `op` on a key containing `pattern` fail.
    pub async fn fail(&self, op: StoreOp, pattern: impl Into<String>) {
        self.state.lock().await.faults.push(Fault {
            op,
            pattern: pattern.into(),
        });
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Delays every `list_dir` response after its snapshot has been taken.
    ///
    /// Widens the window between a directory probe and the writes that follow it.
    pub async fn set_list_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.list_delay = delay;
    }

    /// Number of successful writes to `key` since creation.
    pub async fn write_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .writes
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// All leaf keys at or below `prefix`.
    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .data
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<String> {
        let state = self.state.lock().await;
        state.check(StoreOp::Get, key)?;
        state
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::Put, key)?;
        state.record_write(key, value);
        Ok(())
    }

    async fn list_dir(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let (children, delay) = {
            let state = self.state.lock().await;
            state.check(StoreOp::ListDir, prefix)?;

            let base = format!("{}/", prefix.trim_end_matches('/'));
            let mut children: BTreeMap<String, KeyValue> = BTreeMap::new();
            for (key, value) in state.data.range(base.clone()..) {
                let Some(rest) = key.strip_prefix(&base) else {
                    break;
                };
                match rest.split_once('/') {
                    Some((segment, _)) => {
                        let child = format!("{}{}", base, segment);
                        children.entry(child.clone()).or_insert(KeyValue {
                            key: child,
                            value: String::new(),
                            dir: true,
                        });
                    }
                    None => {
                        children.insert(
                            key.clone(),
                            KeyValue {
                                key: key.clone(),
                                value: value.clone(),
                                dir: false,
                            },
                        );
                    }
                }
            }
            (children, state.list_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if children.is_empty() {
            return Err(StoreError::not_found(prefix));
        }
        Ok(children.into_values().collect())
    }

    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::DeleteTree, prefix)?;

        let dir = prefix.trim_end_matches('/');
        let base = format!("{}/", dir);
        let before = state.data.len();
        state
            .data
            .retain(|key, _| key != dir && !key.starts_with(&base));

        if state.data.len() == before {
            return Err(StoreError::not_found(prefix));
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::CompareAndSwap, key)?;

        if state.data.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        state.record_write(key, value);
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::CompareAndSwap, key)?;

        if state.data.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        state.data.remove(key);
        Ok(true)
    }
}

#[derive(Default)]
struct ArtifactState {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    fail_deletes: bool,
}

/// In-memory `ArtifactStore`
#[derive(Default)]
pub struct MemoryArtifactStore {
    state: Mutex<ArtifactState>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .await
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Object keys under `prefix` in `bucket`.
    pub async fn objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn fail_deletes(&self, fail: bool) {
        self.state.lock().await.fail_deletes = fail;
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn delete_tree(&self, bucket: &str, prefix: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_deletes {
            return Err(StoreError::unavailable(
                "delete_objects",
                format!("{}/{}", bucket, prefix),
                "injected failure",
            ));
        }

        let dir = prefix.trim_end_matches('/');
        let base = format!("{}/", dir);
        if let Some(objects) = state.buckets.get_mut(bucket) {
            objects.retain(|key, _| key != dir && !key.starts_with(&base));
        }
        Ok(())
    }
}

#[derive(Default)]
struct SecretState {
    secrets: BTreeMap<(String, String), BTreeMap<String, String>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    lookups: Vec<String>,
}

/// In-memory `SecretStore`
#[derive(Default)]
pub struct MemorySecretStore {
    state: Mutex<SecretState>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert<I, K, V>(&self, namespace: &str, name: &str, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.state
            .lock()
            .await
            .secrets
            .insert((namespace.to_string(), name.to_string()), pairs);
    }

    /// Makes lookups of secret `name` fail.
    pub async fn fail(&self, name: &str) {
        self.state.lock().await.failing.insert(name.to_string());
    }

    /// Makes lookups of secret `name` take `delay` before answering.
    pub async fn delay(&self, name: &str, delay: Duration) {
        self.state
            .lock()
            .await
            .delays
            .insert(name.to_string(), delay);
    }

    /// Names looked up so far, in order.
    pub async fn lookups(&self) -> Vec<String> {
        self.state.lock().await.lookups.clone()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let delay = {
            let mut state = self.state.lock().await;
            state.lookups.push(name.to_string());
            state.delays.get(name).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().await;
        let key = format!("{}/{}", namespace, name);
        if state.failing.contains(name) {
            return Err(StoreError::unavailable("get_secret", key, "injected failure"));
        }
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }
}
