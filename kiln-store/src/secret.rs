//! Secret store contract

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;

/// Namespaced secret lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches every key/value pair of the secret `name` in `namespace`.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        (**self).get_secret(namespace, name).await
    }
}
