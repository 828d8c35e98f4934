//! Artifact store contract

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Object store holding build logs and artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Deletes every object under `prefix` in `bucket`.
    ///
    /// Deleting an empty prefix succeeds.
    async fn delete_tree(&self, bucket: &str, prefix: &str) -> Result<()>;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn delete_tree(&self, bucket: &str, prefix: &str) -> Result<()> {
        (**self).delete_tree(bucket, prefix).await
    }
}
