//! Notify Service
//!
//! Tells every notifier configured on a build's pipeline how the build went.

use kiln_core::domain::build::Build;
use kiln_core::domain::notification::{Notification, StageStatus};
use kiln_core::domain::pipeline::NotifierConfig;
use kiln_core::paths;
use kiln_store::{MetadataStore, SecretStore, TimeoutStore};
use std::collections::BTreeMap;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::notifier::{Notifier, NotifierRegistry};
use crate::repository::{DecodeMode, pipeline_repository, stage_repository};

/// Sends build notifications through the registered notifiers
pub struct NotifyService {
    store: Arc<dyn MetadataStore>,
    secrets: Arc<dyn SecretStore>,
    registry: NotifierRegistry,
    secret_timeout: Duration,
    notifier_timeout: Duration,
    decode: DecodeMode,
}

impl NotifyService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        secrets: Arc<dyn SecretStore>,
        registry: NotifierRegistry,
        config: &Config,
    ) -> Self {
        Self {
            store: Arc::new(TimeoutStore::new(store, config.store_timeout)),
            secrets,
            registry,
            secret_timeout: config.secret_timeout,
            notifier_timeout: config.notifier_timeout,
            decode: DecodeMode::default(),
        }
    }

    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode = mode;
        self
    }

    /// Notify every configured notifier about `build`.
    ///
    /// Each notifier is attempted even when an earlier one fails; the failures
    /// are reported together. Notifier types without an implementation are
    /// skipped.
    pub async fn notify(&self, build: &Build) -> Result<()> {
        let notification = self.notification(build).await?;

        let pipeline = pipeline_repository::find(&*self.store, &build.pipeline, self.decode)
            .await
            .map_err(|e| BuildError::store("get pipeline", paths::pipeline_path(&build.pipeline), e))?
            .ok_or_else(|| BuildError::PipelineNotFound(build.pipeline.to_string()))?;

        let mut secrets_by_namespace: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        let mut failures = Vec::new();
        for config in &pipeline.notifiers {
            let Some(notifier) = self.registry.get(&config.kind) else {
                tracing::warn!(
                    "No notifier of type {:?} for {}, skipping",
                    config.kind,
                    build.pipeline
                );
                continue;
            };

            let secrets = match secrets_by_namespace.entry(config.namespace.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(self.resolve_secrets(&config.namespace, &pipeline.secrets).await)
                }
            };
            let metadata = metadata(notifier.as_ref(), config, secrets);
            let sent = notifier.send(&notification, &metadata);
            match tokio::time::timeout(self.notifier_timeout, sent).await {
                Ok(true) => {
                    tracing::info!(
                        "Notified {} about {}#{}",
                        config.kind,
                        build.pipeline,
                        build.number
                    );
                }
                Ok(false) => {
                    tracing::warn!("Notifier {} did not deliver", config.kind);
                    failures.push(config.kind.clone());
                }
                Err(_) => {
                    tracing::warn!(
                        "Notifier {} timed out after {:?}",
                        config.kind,
                        self.notifier_timeout
                    );
                    failures.push(format!("{} (timed out)", config.kind));
                }
            }
        }

        if !failures.is_empty() {
            return Err(BuildError::Notify { failures });
        }
        Ok(())
    }

    async fn notification(&self, build: &Build) -> Result<Notification> {
        let path = paths::stages_path(&build.pipeline, build.number);
        let stages = stage_repository::list(&*self.store, &path, self.decode)
            .await
            .map_err(|e| BuildError::store("list stages", &path, e))?;

        Ok(Notification {
            pipeline: build.pipeline.to_string(),
            build_number: build.number,
            build_status: build.status,
            stages: stages
                .into_iter()
                .map(|stage| StageStatus {
                    name: stage.name,
                    status: stage.status,
                })
                .collect(),
        })
    }

    /// Merges the pipeline's secrets; unreadable ones are skipped.
    async fn resolve_secrets(
        &self,
        namespace: &str,
        names: &[String],
    ) -> BTreeMap<String, String> {
        let mut resolved = BTreeMap::new();
        for name in names {
            let lookup = self.secrets.get_secret(namespace, name);
            match tokio::time::timeout(self.secret_timeout, lookup).await {
                Ok(Ok(pairs)) => {
                    resolved.extend(
                        pairs
                            .into_iter()
                            .map(|(key, value)| (key, value.trim().to_string())),
                    );
                }
                Ok(Err(e)) => tracing::warn!("Skipping secret {}/{}: {}", namespace, name, e),
                Err(_) => tracing::warn!(
                    "Skipping secret {}/{}: timed out after {:?}",
                    namespace,
                    name,
                    self.secret_timeout
                ),
            }
        }
        resolved
    }
}

/// Resolves the notifier's metadata keys to secret values.
///
/// Configured keys override the notifier's defaults. A secret key no secret
/// provides resolves to an empty value.
fn metadata(
    notifier: &dyn Notifier,
    config: &NotifierConfig,
    secrets: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut references = notifier.default_metadata();
    references.extend(config.metadata.clone());

    references
        .into_iter()
        .map(|(key, secret_key)| {
            let value = secrets.get(&secret_key).cloned().unwrap_or_default();
            (key, value)
        })
        .collect()
}
