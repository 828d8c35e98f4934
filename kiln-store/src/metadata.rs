//! Metadata store contract

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// A direct child of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Full key of the child
    pub key: String,
    /// Value of a leaf child, empty for directories
    pub value: String,
    pub dir: bool,
}

/// Hierarchical string key-value store with directory semantics
///
/// Keys are slash-delimited. Absent keys and directories are reported as
/// `StoreError::NotFound` so callers can tell absence apart from failure.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<String>;

    /// Reads a decimal integer value.
    async fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get(key).await?;
        value.trim().parse().map_err(|_| StoreError::InvalidValue {
            key: key.to_string(),
            value,
        })
    }

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Writes an integer as its decimal string.
    async fn put_int(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, &value.to_string()).await
    }

    /// Lists the direct children of `prefix`, ordered by key.
    async fn list_dir(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Removes `prefix` and everything below it.
    async fn delete_tree(&self, prefix: &str) -> Result<()>;

    /// Writes `value` only if the current value equals `expected`
    /// (`None` meaning the key must be absent). Returns whether it wrote.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool>;

    /// Deletes `key` only if its value equals `expected`. Returns whether it deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;
}

#[async_trait]
impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<String> {
        (**self).get(key).await
    }

    async fn get_int(&self, key: &str) -> Result<i64> {
        (**self).get_int(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn put_int(&self, key: &str, value: i64) -> Result<()> {
        (**self).put_int(key, value).await
    }

    async fn list_dir(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        (**self).list_dir(prefix).await
    }

    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        (**self).delete_tree(prefix).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        (**self).compare_and_swap(key, expected, value).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        (**self).compare_and_delete(key, expected).await
    }
}
