//! Kiln Store
//!
//! Store contracts consumed by the build persistence core, plus the pieces that
//! sit directly on top of them:
//! - `MetadataStore`: hierarchical string key-value store with directory semantics
//! - `ArtifactStore`: object store addressed by bucket and prefix
//! - `SecretStore`: namespaced secret lookup
//! - `memory`: in-memory implementations with fault injection for tests
//! - `TimeoutStore`: decorator bounding every call with a deadline
//! - `LockManager`: advisory locks built on compare-and-swap

pub mod artifact;
pub mod error;
pub mod lock;
pub mod memory;
pub mod metadata;
pub mod secret;
pub mod timeout;

pub use artifact::ArtifactStore;
pub use error::{Result, StoreError};
pub use lock::{LockGuard, LockManager};
pub use memory::{MemoryArtifactStore, MemoryMetadataStore, MemorySecretStore, StoreOp};
pub use metadata::{KeyValue, MetadataStore};
pub use secret::SecretStore;
pub use timeout::TimeoutStore;
