//! Shared test fixtures

use kiln_core::domain::build::{Build, BuildStatus};
use kiln_core::domain::pipeline::{Pipeline, PipelineKey};
use kiln_core::domain::stage::Stage;
use kiln_core::paths;
use kiln_store::{MemoryArtifactStore, MemoryMetadataStore, MemorySecretStore};
use kiln_template::StandardEngine;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::notifier::NotifierRegistry;
use crate::repository::pipeline_repository;
use crate::service::{BuildService, NotifyService};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_orchestrator=debug,kiln_store=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Short deadlines so failure paths finish quickly.
pub(crate) fn config() -> Config {
    Config {
        store_timeout: Duration::from_secs(1),
        secret_timeout: Duration::from_millis(100),
        notifier_timeout: Duration::from_millis(200),
        lock_acquire_timeout: Duration::from_secs(2),
        lock_retry_interval: Duration::from_millis(5),
        ..Config::default()
    }
}

/// `acme/api` with a build, test and deploy stage.
pub(crate) fn pipeline() -> Pipeline {
    let mut build = Stage::template("build", "docker_build");
    build
        .params
        .insert("dockerfile".to_string(), json!("Dockerfile"));
    build
        .labels
        .insert("region".to_string(), "{{ region }}".to_string());

    let mut test = Stage::template("test", "command");
    test.params
        .insert("command".to_string(), json!(["make", "test"]));

    let mut deploy = Stage::template("deploy", "deploy");
    deploy.vars.insert("env".to_string(), json!("staging"));
    deploy
        .vars
        .insert("image".to_string(), json!("app:{{ env }}"));
    deploy
        .params
        .insert("image".to_string(), json!("app:{{ env }}"));
    deploy.artifacts.push("deploy.log".to_string());

    Pipeline {
        id: "5b0f7c6e-9a43-4d6e-8f1a-2c7d3e4b5a69".to_string(),
        key: PipelineKey::new("acme", "api"),
        vars: [
            ("env".to_string(), json!("prod")),
            ("region".to_string(), json!("eu-west-1")),
        ]
        .into(),
        secrets: vec!["hook-secrets".to_string(), "team-secrets".to_string()],
        notifiers: Vec::new(),
        stages: vec![build, test, deploy],
        latest_build: None,
    }
}

/// A pending build of `pipeline` carrying its stage templates.
pub(crate) fn build(pipeline: &Pipeline, number: u64) -> Build {
    Build {
        id: format!("00000000-0000-4000-8000-{:012}", number),
        number,
        status: BuildStatus::Pending,
        created: 1_700_000_000_000_000_000,
        started: 0,
        finished: 0,
        current_stage: 0,
        branch: "main".to_string(),
        commit: "4f2a9c1".to_string(),
        author: "dev@example.com".to_string(),
        event: "push".to_string(),
        clone_url: "https://git.example.com/acme/api.git".to_string(),
        pipeline: pipeline.key.clone(),
        stages: pipeline.stages.clone(),
    }
}

/// In-memory stores plus the pipeline under test
pub(crate) struct Harness {
    pub metadata: Arc<MemoryMetadataStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub secrets: Arc<MemorySecretStore>,
    pub pipeline: Pipeline,
}

impl Harness {
    /// Empty stores; the pipeline is not stored.
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(MemoryMetadataStore::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
            secrets: Arc::new(MemorySecretStore::new()),
            pipeline: pipeline(),
        }
    }

    pub async fn with_pipeline() -> Self {
        Self::with(pipeline()).await
    }

    pub async fn with(pipeline: Pipeline) -> Self {
        let harness = Self {
            pipeline,
            ..Self::new()
        };
        pipeline_repository::save(&*harness.metadata, &harness.pipeline)
            .await
            .expect("seed pipeline");
        harness
    }

    pub fn build_service(&self) -> BuildService {
        self.build_service_with(&config())
    }

    pub fn build_service_with(&self, config: &Config) -> BuildService {
        BuildService::new(
            self.metadata.clone(),
            self.artifacts.clone(),
            Arc::new(StandardEngine::new()),
            config,
        )
    }

    pub fn notify_service(&self, registry: NotifierRegistry) -> NotifyService {
        NotifyService::new(
            self.metadata.clone(),
            self.secrets.clone(),
            registry,
            &config(),
        )
    }

    /// Stores a log and an artifact for build `number`.
    pub async fn seed_artifacts(&self, number: u64) {
        let prefix = paths::artifact_prefix(&self.pipeline.id, number);
        let bucket = paths::DEFAULT_ARTIFACT_BUCKET;
        self.artifacts
            .put_object(bucket, &format!("{}/logs/1.log", prefix), "building...")
            .await;
        self.artifacts
            .put_object(bucket, &format!("{}/artifacts/app.tar", prefix), vec![0u8; 16])
            .await;
    }

    pub async fn artifacts_of(&self, number: u64) -> Vec<String> {
        let prefix = paths::artifact_prefix(&self.pipeline.id, number);
        self.artifacts
            .objects(paths::DEFAULT_ARTIFACT_BUCKET, &prefix)
            .await
    }
}
