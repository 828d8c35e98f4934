//! Deadline decorator for stores

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::artifact::ArtifactStore;
use crate::error::{Result, StoreError};
use crate::metadata::{KeyValue, MetadataStore};
use crate::secret::SecretStore;

/// Wraps a store so no single call can outlive `timeout`
///
/// A call that misses its deadline is dropped and reported as
/// `StoreError::Timeout`.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        key: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout {
                op,
                key: key.to_string(),
                after: self.timeout,
            })?
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for TimeoutStore<S> {
    async fn get(&self, key: &str) -> Result<String> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn get_int(&self, key: &str) -> Result<i64> {
        self.bounded("get", key, self.inner.get_int(key)).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.bounded("put", key, self.inner.put(key, value)).await
    }

    async fn put_int(&self, key: &str, value: i64) -> Result<()> {
        self.bounded("put", key, self.inner.put_int(key, value)).await
    }

    async fn list_dir(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        self.bounded("list_dir", prefix, self.inner.list_dir(prefix))
            .await
    }

    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        self.bounded("delete_tree", prefix, self.inner.delete_tree(prefix))
            .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        self.bounded(
            "compare_and_swap",
            key,
            self.inner.compare_and_swap(key, expected, value),
        )
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.bounded(
            "compare_and_delete",
            key,
            self.inner.compare_and_delete(key, expected),
        )
        .await
    }
}

#[async_trait]
impl<S: ArtifactStore> ArtifactStore for TimeoutStore<S> {
    async fn delete_tree(&self, bucket: &str, prefix: &str) -> Result<()> {
        self.bounded(
            "delete_objects",
            prefix,
            self.inner.delete_tree(bucket, prefix),
        )
        .await
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for TimeoutStore<S> {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        self.bounded("get_secret", name, self.inner.get_secret(namespace, name))
            .await
    }
}
