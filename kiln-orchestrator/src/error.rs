//! Error types for build persistence

use kiln_store::StoreError;
use kiln_template::TemplateError;
use thiserror::Error;

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors returned by the build and notification services
#[derive(Debug, Error)]
pub enum BuildError {
    /// Build failed write-time validation; nothing was written
    #[error("invalid build: {0}")]
    InvalidBuild(String),

    /// Owning pipeline is absent from the metadata store
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// A store call failed
    #[error("{op} {path}: {source}")]
    Store {
        op: &'static str,
        path: String,
        source: StoreError,
    },

    /// A stage template could not be rendered
    #[error("stage {stage:?}: {source}")]
    Template { stage: String, source: TemplateError },

    /// Metadata was deleted but the artifact prefix was not
    ///
    /// The artifacts stay behind until a later delete of the same build or an
    /// artifact sweep removes them.
    #[error("metadata {path} deleted but artifacts under {prefix} remain: {source}")]
    ArtifactsOrphaned {
        path: String,
        prefix: String,
        source: StoreError,
    },

    /// One or more notifiers did not deliver
    #[error("{} notifier(s) failed: {}", .failures.len(), .failures.join(", "))]
    Notify { failures: Vec<String> },
}

impl BuildError {
    pub(crate) fn store(op: &'static str, path: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            op,
            path: path.into(),
            source,
        }
    }

    /// Check if the underlying store reported the key as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_not_found())
    }
}
