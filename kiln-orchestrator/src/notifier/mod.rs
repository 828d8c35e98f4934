//! Notifiers
//!
//! A notifier delivers a build's outcome to an external system. Pipelines
//! name notifiers by type; the registry maps each type to an implementation.

pub mod slack;

use async_trait::async_trait;
use kiln_core::domain::notification::Notification;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use slack::SlackNotifier;

/// Delivers build notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Type name pipelines use to select this notifier
    fn kind(&self) -> &str;

    /// Metadata key -> secret key pairs used unless the pipeline overrides them
    fn default_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Posts the notification. Returns whether it was delivered.
    async fn send(&self, notification: &Notification, metadata: &BTreeMap<String, String>) -> bool;
}

/// Notifier implementations by type
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in notifier
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SlackNotifier::new()));
        registry
    }

    /// Registers `notifier` under its kind, replacing any previous one.
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.kind().to_string(), notifier);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.notifiers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
