//! Kiln Orchestrator
//!
//! Persists CI builds and their stages in a hierarchical metadata store,
//! removes them together with their artifacts, and notifies the pipeline's
//! notifiers about build outcomes.
//!
//! - `repository`: field-per-key mapping of builds, stages and pipelines
//! - `service`: save, stage creation, deletion and notification
//! - `notifier`: notifier contract, registry and the Slack implementation
//! - `config`: timeouts, lock tuning and artifact location

pub mod config;
pub mod error;
pub mod notifier;
pub mod repository;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{BuildError, Result};
pub use notifier::{Notifier, NotifierRegistry, SlackNotifier};
pub use repository::DecodeMode;
pub use service::{BuildService, NotifyService};
