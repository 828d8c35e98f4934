//! Build Service
//!
//! Persists builds and their stages, and removes them again.
//!
//! Check-then-create on a build runs under a per-build advisory lock when
//! locking is enabled. Without it, two concurrent saves of the same new build
//! can both see it as new and both create its stages. Stage templates are
//! rendered before the lock is taken; only store calls run while it is held.

use kiln_core::domain::build::{Build, BuildStatus, BuildSummary};
use kiln_core::domain::pipeline::PipelineKey;
use kiln_core::domain::stage::Stage;
use kiln_core::paths;
use kiln_store::{ArtifactStore, LockGuard, LockManager, MetadataStore, TimeoutStore};
use kiln_template::TemplateEngine;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::repository::{DecodeMode, build_repository, codec, pipeline_repository, stage_repository};
use crate::service::materialize::materialize;

/// Build persistence over a metadata store and an artifact store
pub struct BuildService {
    store: Arc<dyn MetadataStore>,
    artifacts: Arc<dyn ArtifactStore>,
    engine: Arc<dyn TemplateEngine>,
    locks: Option<LockManager>,
    artifact_bucket: String,
    decode: DecodeMode,
}

impl BuildService {
    /// Creates the service. Every store call is bounded by `config.store_timeout`.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        artifacts: Arc<dyn ArtifactStore>,
        engine: Arc<dyn TemplateEngine>,
        config: &Config,
    ) -> Self {
        let store: Arc<dyn MetadataStore> = Arc::new(TimeoutStore::new(store, config.store_timeout));
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(TimeoutStore::new(artifacts, config.store_timeout));

        let locks = config.advisory_locks.then(|| {
            LockManager::new(Arc::clone(&store), config.lock_ttl)
                .with_acquire_timeout(config.lock_acquire_timeout)
                .with_retry_interval(config.lock_retry_interval)
        });

        Self {
            store,
            artifacts,
            engine,
            locks,
            artifact_bucket: config.artifact_bucket.clone(),
            decode: DecodeMode::default(),
        }
    }

    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode = mode;
        self
    }

    /// Create or update a build.
    ///
    /// A new build gets its scalar fields and its materialized stages. An
    /// existing build only gets its scalar fields rewritten. If a new build
    /// fails part way, everything written for it is removed again; a failed
    /// update leaves the fields written so far in place.
    pub async fn save(&self, build: &mut Build) -> Result<()> {
        validate(build)?;

        let mut stages = self.prepare_if_new(build).await?;
        loop {
            let guard = self.lock(build).await?;
            let result = self.save_locked(build, &mut stages).await;
            self.unlock(guard).await;

            match result? {
                Saved::Done => return Ok(()),
                // Deleted between the unlocked probe and the lock.
                Saved::NeedsStages => stages = Some(self.prepare_stages(build).await?),
            }
        }
    }

    /// Materialize and persist the stages of a build that has none yet.
    ///
    /// Stage templates are rendered against the pipeline's variables, given
    /// indexes 1..=n and fresh ids, and reset to pending. `build.stages` is
    /// replaced with the persisted stages.
    pub async fn create_stages(&self, build: &mut Build) -> Result<()> {
        validate(build)?;

        let stages = self.prepare_stages(build).await?;
        let guard = self.lock(build).await?;
        let result = self.create_stages_once(build, stages).await;
        self.unlock(guard).await;
        result
    }

    /// Load the stages of a build into `build.stages`, ordered by index.
    pub async fn get_stages(&self, build: &mut Build) -> Result<Vec<Stage>> {
        let path = paths::stages_path(&build.pipeline, build.number);
        let stages = stage_repository::list(&*self.store, &path, self.decode)
            .await
            .map_err(|e| BuildError::store("list stages", &path, e))?;

        build.stages = stages.clone();
        Ok(stages)
    }

    /// Get one stage of a build, `None` if it does not exist
    pub async fn get_stage(&self, build: &Build, index: u32) -> Result<Option<Stage>> {
        let path = paths::stage_path(&build.pipeline, build.number, index);
        stage_repository::find(&*self.store, &path, self.decode)
            .await
            .map_err(|e| BuildError::store("get stage", &path, e))
    }

    /// Delete a build's metadata, then its artifacts and logs.
    ///
    /// Metadata that is already gone counts as deleted, so retrying a delete
    /// that orphaned its artifacts removes them.
    pub async fn delete(&self, build: &Build, pipeline_id: &str) -> Result<()> {
        let guard = self.lock(build).await?;
        let result = self.delete_locked(build, pipeline_id).await;
        self.unlock(guard).await;
        result
    }

    /// Get a build with its stages
    pub async fn find(&self, key: &PipelineKey, number: u64) -> Result<Option<Build>> {
        build_repository::find(&*self.store, key, number, self.decode)
            .await
            .map_err(|e| BuildError::store("get build", paths::build_path(key, number), e))
    }

    pub async fn find_summary(
        &self,
        key: &PipelineKey,
        number: u64,
    ) -> Result<Option<BuildSummary>> {
        build_repository::find_summary(&*self.store, key, number, self.decode)
            .await
            .map_err(|e| BuildError::store("get build", paths::build_path(key, number), e))
    }

    /// List summaries of every build of a pipeline, ordered by number
    pub async fn list_summaries(&self, key: &PipelineKey) -> Result<Vec<BuildSummary>> {
        build_repository::list_summaries(&*self.store, key, self.decode)
            .await
            .map_err(|e| BuildError::store("list builds", paths::builds_path(key), e))
    }

    // =========================================================================
    // Stage preparation
    // =========================================================================

    async fn is_new(&self, build: &Build) -> Result<bool> {
        let exists = build_repository::exists(&*self.store, &build.pipeline, build.number)
            .await
            .map_err(|e| {
                BuildError::store("probe build", paths::build_path(&build.pipeline, build.number), e)
            })?;
        Ok(!exists)
    }

    /// Renders the stages when the build looks new; the locked probe decides.
    async fn prepare_if_new(&self, build: &Build) -> Result<Option<Vec<Stage>>> {
        if !self.is_new(build).await? {
            return Ok(None);
        }
        self.prepare_stages(build).await.map(Some)
    }

    /// Materializes the build's stage templates without writing anything.
    ///
    /// Stages get indexes 1..=n, fresh ids and pending status.
    async fn prepare_stages(&self, build: &Build) -> Result<Vec<Stage>> {
        let pipeline = pipeline_repository::find(&*self.store, &build.pipeline, self.decode)
            .await
            .map_err(|e| {
                BuildError::store("get pipeline", paths::pipeline_path(&build.pipeline), e)
            })?
            .ok_or_else(|| BuildError::PipelineNotFound(build.pipeline.to_string()))?;

        let mut stages = Vec::with_capacity(build.stages.len());
        for (position, template) in build.stages.iter().enumerate() {
            let mut stage = template.clone();
            stage.id = Uuid::new_v4().to_string();
            stage.status = BuildStatus::Pending;
            stage.index = u32::try_from(position + 1)
                .map_err(|_| BuildError::InvalidBuild("too many stages".to_string()))?;

            let stage = materialize(&*self.engine, &stage, &pipeline.vars).map_err(|source| {
                BuildError::Template {
                    stage: template.name.clone(),
                    source,
                }
            })?;
            stages.push(stage);
        }
        Ok(stages)
    }

    // =========================================================================
    // Locked sections
    // =========================================================================

    async fn save_locked(
        &self,
        build: &mut Build,
        stages: &mut Option<Vec<Stage>>,
    ) -> Result<Saved> {
        let path = paths::build_path(&build.pipeline, build.number);
        let is_new = self.is_new(build).await?;
        if is_new && stages.is_none() {
            return Ok(Saved::NeedsStages);
        }

        if let Err(e) = build_repository::save_fields(&*self.store, build).await {
            let err = BuildError::store("save build", &path, e);
            return Err(self.handle_save_error(&path, is_new, err).await);
        }

        let Some(stages) = stages.take().filter(|_| is_new) else {
            tracing::debug!("Build {}#{} updated", build.pipeline, build.number);
            return Ok(Saved::Done);
        };

        if let Err(err) = self.write_stages(build, stages).await {
            return Err(self.handle_save_error(&path, is_new, err).await);
        }

        tracing::info!(
            "Build {}#{} created with {} stage(s)",
            build.pipeline,
            build.number,
            build.stages.len()
        );
        Ok(Saved::Done)
    }

    async fn create_stages_once(&self, build: &mut Build, stages: Vec<Stage>) -> Result<()> {
        let path = paths::stages_path(&build.pipeline, build.number);
        let exists = codec::dir_exists(&*self.store, &path)
            .await
            .map_err(|e| BuildError::store("probe stages", &path, e))?;
        if exists {
            return Err(BuildError::InvalidBuild(format!(
                "stages of {}#{} already exist",
                build.pipeline, build.number
            )));
        }
        self.write_stages(build, stages).await
    }

    async fn write_stages(&self, build: &mut Build, stages: Vec<Stage>) -> Result<()> {
        let path = paths::stages_path(&build.pipeline, build.number);
        for stage in &stages {
            stage_repository::save(&*self.store, &path, stage)
                .await
                .map_err(|e| BuildError::store("save stage", format!("{}/{}", path, stage.index), e))?;
        }

        build.stages = stages;
        Ok(())
    }

    /// Rolls back a failed creation. Returns the original error.
    async fn handle_save_error(&self, path: &str, is_new: bool, err: BuildError) -> BuildError {
        if !is_new {
            tracing::warn!("Update of {} failed, fields written so far are kept: {}", path, err);
            return err;
        }

        tracing::warn!("Creation of {} failed, rolling back: {}", path, err);
        match self.store.delete_tree(path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::error!("Rollback of {} failed: {}", path, e),
        }
        err
    }

    async fn delete_locked(&self, build: &Build, pipeline_id: &str) -> Result<()> {
        let path = paths::build_path(&build.pipeline, build.number);
        let prefix = paths::artifact_prefix(pipeline_id, build.number);

        match self.store.delete_tree(&path).await {
            Ok(()) => tracing::info!("Deleted build {}", path),
            Err(e) if e.is_not_found() => {
                tracing::info!("Build {} already gone, removing artifacts", path);
            }
            Err(e) => return Err(BuildError::store("delete build", path, e)),
        }

        if let Err(source) = self.artifacts.delete_tree(&self.artifact_bucket, &prefix).await {
            tracing::error!(
                "Artifacts under {}/{} orphaned by delete of {}: {}",
                self.artifact_bucket,
                prefix,
                path,
                source
            );
            return Err(BuildError::ArtifactsOrphaned { path, prefix, source });
        }

        Ok(())
    }

    // =========================================================================
    // Locking
    // =========================================================================

    async fn lock(&self, build: &Build) -> Result<Option<LockGuard>> {
        let Some(locks) = &self.locks else {
            return Ok(None);
        };
        let key = paths::build_lock_path(&build.pipeline, build.number);
        locks
            .acquire(&key)
            .await
            .map(Some)
            .map_err(|e| BuildError::store("lock build", key, e))
    }

    async fn unlock(&self, guard: Option<LockGuard>) {
        let Some(guard) = guard else {
            return;
        };
        let key = guard.key().to_string();
        if let Err(e) = guard.release().await {
            tracing::warn!("Releasing lock {} failed, it expires on its own: {}", key, e);
        }
    }
}

/// Outcome of one locked save attempt
enum Saved {
    Done,
    /// The build is new but its stages were not rendered yet.
    NeedsStages,
}

// =============================================================================
// Validation
// =============================================================================

fn validate(build: &Build) -> Result<()> {
    if !build.pipeline.is_valid() {
        return Err(BuildError::InvalidBuild(format!(
            "invalid pipeline {:?}",
            build.pipeline.to_string()
        )));
    }
    if build.number == 0 || i64::try_from(build.number).is_err() {
        return Err(BuildError::InvalidBuild(format!(
            "build number {} out of range",
            build.number
        )));
    }
    if build.created < 0 || build.started < 0 || build.finished < 0 {
        return Err(BuildError::InvalidBuild(
            "timestamps must not be negative".to_string(),
        ));
    }

    // Templates carry no index yet; persisted stages are numbered 1..=n.
    let templates = build.stages.iter().all(|s| s.index == 0);
    let numbered = build
        .stages
        .iter()
        .enumerate()
        .all(|(position, s)| s.index as usize == position + 1);
    if !templates && !numbered {
        return Err(BuildError::InvalidBuild(
            "stage indexes must be unset or run 1..=n".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Harness};
    use kiln_core::domain::build::BuildTrigger;
    use kiln_store::{MemoryMetadataStore, StoreError, StoreOp};
    use kiln_template::{StandardEngine, TemplateError};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Renders with the standard engine and notes whether the build lock was held.
    struct LockWatcher {
        store: Arc<MemoryMetadataStore>,
        key: String,
        engine: StandardEngine,
        renders: AtomicUsize,
        renders_under_lock: AtomicUsize,
    }

    impl TemplateEngine for LockWatcher {
        fn render(
            &self,
            name: &str,
            template: &str,
            vars: &BTreeMap<String, String>,
        ) -> std::result::Result<String, TemplateError> {
            let held = tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(self.store.get(&self.key))
            })
            .is_ok();
            self.renders.fetch_add(1, Ordering::SeqCst);
            if held {
                self.renders_under_lock.fetch_add(1, Ordering::SeqCst);
            }
            self.engine.render(name, template, vars)
        }
    }

    #[test]
    fn test_validate_rejects_bad_builds() {
        let pipeline = testing::pipeline();
        let good = testing::build(&pipeline, 1);
        assert!(validate(&good).is_ok());

        let mut zero = good.clone();
        zero.number = 0;
        assert!(matches!(validate(&zero), Err(BuildError::InvalidBuild(_))));

        let mut huge = good.clone();
        huge.number = u64::MAX;
        assert!(validate(&huge).is_err());

        let mut nameless = good.clone();
        nameless.pipeline = PipelineKey::new("acme", "");
        assert!(validate(&nameless).is_err());

        let mut negative = good.clone();
        negative.started = -1;
        assert!(validate(&negative).is_err());

        let mut gaps = good.clone();
        for (i, stage) in gaps.stages.iter_mut().enumerate() {
            stage.index = (i as u32 + 1) * 2;
        }
        assert!(validate(&gaps).is_err());
    }

    #[tokio::test]
    async fn test_save_new_build_round_trips() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();

        let loaded = service.find(&build.pipeline, 1).await.unwrap().unwrap();
        assert_eq!(loaded, build);
        assert_eq!(
            loaded.stages.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(loaded.stages.iter().all(|s| s.status == BuildStatus::Pending));
        assert!(loaded.stages.iter().all(|s| Uuid::parse_str(&s.id).is_ok()));
    }

    #[tokio::test]
    async fn test_resave_leaves_stages_alone() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        let stage_path = "pipelines/acme/api/builds/1/stages/1/uuid";
        assert_eq!(harness.metadata.write_count(stage_path).await, 1);

        build.status = BuildStatus::Running;
        build.current_stage = 1;
        service.save(&mut build).await.unwrap();
        service.save(&mut build).await.unwrap();

        assert_eq!(harness.metadata.write_count(stage_path).await, 1);
        let loaded = service.find(&build.pipeline, 1).await.unwrap().unwrap();
        assert_eq!(loaded, build);
    }

    #[tokio::test]
    async fn test_stage_vars_override_pipeline_vars() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();

        let deploy = service.get_stage(&build, 3).await.unwrap().unwrap();
        assert_eq!(deploy.name, "deploy");
        assert_eq!(deploy.vars["image"], json!("app:staging"));
        assert_eq!(deploy.params["image"], json!("app:staging"));

        let stored = harness
            .metadata
            .get("pipelines/acme/api/builds/1/stages/3/vars")
            .await
            .unwrap();
        assert!(stored.contains("app:staging"));
    }

    #[tokio::test]
    async fn test_get_stages_and_missing_stage() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 2);
        service.save(&mut build).await.unwrap();

        let mut reloaded = build.clone();
        reloaded.stages.clear();
        let stages = service.get_stages(&mut reloaded).await.unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["build", "test", "deploy"]);
        assert_eq!(reloaded.stages, stages);

        assert!(service.get_stage(&build, 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_creation_rolls_back() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        harness
            .metadata
            .fail(StoreOp::Put, "builds/1/stages/2/")
            .await;

        let mut build = testing::build(&harness.pipeline, 1);
        let err = service.save(&mut build).await.unwrap_err();
        assert!(matches!(err, BuildError::Store { op: "save stage", .. }));

        assert!(harness.metadata.keys("pipelines/acme/api/builds/1").await.is_empty());
        assert!(service.find(&build.pipeline, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_template_error_writes_nothing() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        build.stages[1]
            .params
            .insert("command".to_string(), json!("make {{ target }}"));

        let err = service.save(&mut build).await.unwrap_err();
        assert!(matches!(err, BuildError::Template { ref stage, .. } if stage == "test"));
        assert!(harness.metadata.keys("pipelines/acme/api/builds/").await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_template_output_fails_cleanly() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        build.stages[0].params.insert(
            "padding".to_string(),
            json!(r#"{{ "ab" | repeat(9223372036854775807) }}"#),
        );

        let err = service.save(&mut build).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Template {
                source: TemplateError::Exec { .. },
                ..
            }
        ));
        assert!(harness.metadata.keys("pipelines/acme/api/builds/").await.is_empty());
        assert!(harness.metadata.keys("locks/").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_templates_render_outside_the_lock() {
        let harness = Harness::with_pipeline().await;
        let watcher = Arc::new(LockWatcher {
            store: harness.metadata.clone(),
            key: paths::build_lock_path(&harness.pipeline.key, 1),
            engine: StandardEngine::new(),
            renders: AtomicUsize::new(0),
            renders_under_lock: AtomicUsize::new(0),
        });
        let service = BuildService::new(
            harness.metadata.clone(),
            harness.artifacts.clone(),
            watcher.clone(),
            &testing::config(),
        );

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        let mut other = testing::build(&harness.pipeline, 1);
        service.delete(&build, &harness.pipeline.id).await.unwrap();
        service.create_stages(&mut other).await.unwrap();

        assert!(watcher.renders.load(Ordering::SeqCst) > 0);
        assert_eq!(watcher.renders_under_lock.load(Ordering::SeqCst), 0);
        assert_eq!(other.stages.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_update_is_not_rolled_back() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();

        harness.metadata.fail(StoreOp::Put, "builds/1/commit").await;
        build.status = BuildStatus::Success;
        assert!(service.save(&mut build).await.is_err());

        let loaded = service.find(&build.pipeline, 1).await.unwrap().unwrap();
        assert_eq!(loaded.status, BuildStatus::Success);
        assert_eq!(loaded.stages.len(), 3);
    }

    #[tokio::test]
    async fn test_save_without_pipeline() {
        let harness = Harness::new();
        let service = harness.build_service();

        let mut build = testing::build(&testing::pipeline(), 1);
        let err = service.save(&mut build).await.unwrap_err();
        assert!(matches!(err, BuildError::PipelineNotFound(ref name) if name == "acme/api"));
        assert!(harness.metadata.keys("pipelines/").await.is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_writes_nothing() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        harness.metadata.fail(StoreOp::ListDir, "builds/1").await;

        let mut build = testing::build(&harness.pipeline, 1);
        let err = service.save(&mut build).await.unwrap_err();
        assert!(matches!(err, BuildError::Store { op: "probe build", .. }));
        assert!(harness.metadata.keys("pipelines/acme/api/builds/").await.is_empty());
    }

    #[tokio::test]
    async fn test_create_stages_refuses_existing_stages() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();

        let mut again = testing::build(&harness.pipeline, 1);
        let err = service.create_stages(&mut again).await.unwrap_err();
        assert!(matches!(err, BuildError::InvalidBuild(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_metadata_and_artifacts() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        harness.seed_artifacts(1).await;

        service.delete(&build, &harness.pipeline.id).await.unwrap();

        assert!(service.find(&build.pipeline, 1).await.unwrap().is_none());
        assert!(harness.artifacts_of(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_metadata_failure_keeps_artifacts() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        harness.seed_artifacts(1).await;
        harness.metadata.fail(StoreOp::DeleteTree, "builds/1").await;

        let err = service.delete(&build, &harness.pipeline.id).await.unwrap_err();
        assert!(matches!(err, BuildError::Store { op: "delete build", .. }));

        assert_eq!(harness.artifacts_of(1).await.len(), 2);
        assert!(service.find(&build.pipeline, 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_artifact_failure_reports_orphans() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        harness.seed_artifacts(1).await;
        harness.artifacts.fail_deletes(true).await;

        let err = service.delete(&build, &harness.pipeline.id).await.unwrap_err();
        match &err {
            BuildError::ArtifactsOrphaned { prefix, .. } => {
                assert_eq!(prefix, &format!("pipelines/{}/builds/1", harness.pipeline.id));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(service.find(&build.pipeline, 1).await.unwrap().is_none());
        assert_eq!(harness.artifacts_of(1).await.len(), 2);

        // Retrying the delete cleans up what the first attempt left.
        harness.artifacts.fail_deletes(false).await;
        service.delete(&build, &harness.pipeline.id).await.unwrap();
        assert!(harness.artifacts_of(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_summaries() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        for number in [3, 1, 2] {
            let mut build = testing::build(&harness.pipeline, number);
            service.save(&mut build).await.unwrap();
        }

        let key = harness.pipeline.key.clone();
        let numbers: Vec<_> = service
            .list_summaries(&key)
            .await
            .unwrap()
            .iter()
            .map(|s| s.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(service.find_summary(&key, 2).await.unwrap().unwrap().number, 2);
    }

    #[tokio::test]
    async fn test_strict_decode_surfaces_garbage() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        let mut build = testing::build(&harness.pipeline, 1);
        service.save(&mut build).await.unwrap();
        harness
            .metadata
            .put("pipelines/acme/api/builds/1/status", "HALF-DONE")
            .await
            .unwrap();

        let lenient = service.find(&build.pipeline, 1).await.unwrap().unwrap();
        assert_eq!(lenient.status, BuildStatus::Pending);

        let strict = harness.build_service().with_decode_mode(DecodeMode::Strict);
        let err = strict.find(&build.pipeline, 1).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Store {
                source: StoreError::InvalidValue { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creation_without_lock_duplicates_stages() {
        let harness = Harness::with_pipeline().await;
        let mut config = testing::config();
        config.advisory_locks = false;
        let service = harness.build_service_with(&config);
        harness
            .metadata
            .set_list_delay(Some(Duration::from_millis(50)))
            .await;

        let mut first = testing::build(&harness.pipeline, 1);
        let mut second = first.clone();
        let (a, b) = tokio::join!(service.save(&mut first), service.save(&mut second));
        a.unwrap();
        b.unwrap();

        let stage_id = "pipelines/acme/api/builds/1/stages/1/uuid";
        assert_eq!(harness.metadata.write_count(stage_id).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_creation_with_lock_creates_stages_once() {
        testing::init_tracing();
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();
        harness
            .metadata
            .set_list_delay(Some(Duration::from_millis(50)))
            .await;

        let mut first = testing::build(&harness.pipeline, 1);
        let mut second = first.clone();
        let (a, b) = tokio::join!(service.save(&mut first), service.save(&mut second));
        a.unwrap();
        b.unwrap();

        let stage_id = "pipelines/acme/api/builds/1/stages/1/uuid";
        assert_eq!(harness.metadata.write_count(stage_id).await, 1);
    }

    #[tokio::test]
    async fn test_from_pipeline_build_saves() {
        let harness = Harness::with_pipeline().await;
        let service = harness.build_service();

        let trigger = BuildTrigger {
            branch: "feature/x".to_string(),
            ..Default::default()
        };
        let mut build = Build::from_pipeline(&harness.pipeline, 4, trigger);
        service.save(&mut build).await.unwrap();

        let summary = service.find_summary(&build.pipeline, 4).await.unwrap().unwrap();
        assert_eq!(summary.branch, "feature/x");
        assert_eq!(summary.id, build.id);
    }
}
