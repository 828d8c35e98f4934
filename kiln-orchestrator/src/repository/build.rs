//! Build Repository
//!
//! Handles metadata store access for builds. A build's scalar fields live
//! directly under its path; its stages are handled by the stage repository.

use kiln_core::domain::build::{Build, BuildSummary};
use kiln_core::domain::pipeline::PipelineKey;
use kiln_core::paths;
use kiln_store::{MetadataStore, StoreError};

use super::codec::{self, DecodeMode, FieldReader};
use super::stage as stage_repository;

const ID: &str = "uuid";
const STATUS: &str = "status";
const BRANCH: &str = "branch";
const COMMIT: &str = "commit";
const AUTHOR: &str = "author";
const EVENT: &str = "event";
const CLONE_URL: &str = "clone-url";
const PIPELINE: &str = "pipeline";
const CREATED: &str = "created";
const STARTED: &str = "started";
const FINISHED: &str = "finished";
const NUMBER: &str = "number";
const CURRENT_STAGE: &str = "current-stage";

/// Check whether a build directory exists
pub async fn exists(
    store: &dyn MetadataStore,
    key: &PipelineKey,
    number: u64,
) -> Result<bool, StoreError> {
    codec::dir_exists(store, &paths::build_path(key, number)).await
}

/// Write the scalar fields of `build` in a fixed order.
///
/// Stops at the first failure, which leaves earlier fields written.
pub async fn save_fields(store: &dyn MetadataStore, build: &Build) -> Result<(), StoreError> {
    let path = paths::build_path(&build.pipeline, build.number);
    let key = |field: &str| codec::field_key(&path, field);

    store.put(&key(ID), &build.id).await?;
    store.put(&key(STATUS), build.status.as_str()).await?;
    store.put(&key(BRANCH), &build.branch).await?;
    store.put(&key(COMMIT), &build.commit).await?;
    store.put(&key(AUTHOR), &build.author).await?;
    store.put(&key(EVENT), &build.event).await?;
    store.put(&key(CLONE_URL), &build.clone_url).await?;
    store.put(&key(PIPELINE), &build.pipeline.to_string()).await?;

    store.put(&key(CREATED), &build.created.to_string()).await?;
    store.put(&key(STARTED), &build.started.to_string()).await?;
    store.put(&key(FINISHED), &build.finished.to_string()).await?;

    let number = key(NUMBER);
    let value = i64::try_from(build.number).map_err(|_| StoreError::InvalidValue {
        key: number.clone(),
        value: build.number.to_string(),
    })?;
    store.put_int(&number, value).await?;
    store
        .put_int(&key(CURRENT_STAGE), i64::from(build.current_stage))
        .await?;

    Ok(())
}

/// Find a build with its stages
pub async fn find(
    store: &dyn MetadataStore,
    key: &PipelineKey,
    number: u64,
    mode: DecodeMode,
) -> Result<Option<Build>, StoreError> {
    if !exists(store, key, number).await? {
        return Ok(None);
    }

    let path = paths::build_path(key, number);
    let fields = FieldReader::new(store, &path, mode);
    let stages = stage_repository::list(store, &paths::stages_path(key, number), mode).await?;

    Ok(Some(Build {
        id: fields.string(ID).await?,
        number: read_number(&fields, number).await?,
        status: fields.status(STATUS).await?,
        created: fields.int(CREATED).await?,
        started: fields.int(STARTED).await?,
        finished: fields.int(FINISHED).await?,
        current_stage: fields.unsigned(CURRENT_STAGE).await?,
        branch: fields.string(BRANCH).await?,
        commit: fields.string(COMMIT).await?,
        author: fields.string(AUTHOR).await?,
        event: fields.string(EVENT).await?,
        clone_url: fields.string(CLONE_URL).await?,
        pipeline: key.clone(),
        stages,
    }))
}

/// Find the listing projection of one build
pub async fn find_summary(
    store: &dyn MetadataStore,
    key: &PipelineKey,
    number: u64,
    mode: DecodeMode,
) -> Result<Option<BuildSummary>, StoreError> {
    if !exists(store, key, number).await? {
        return Ok(None);
    }
    let path = paths::build_path(key, number);
    read_summary(store, &path, number, mode).await.map(Some)
}

/// List summaries of every build of a pipeline, ordered by number.
pub async fn list_summaries(
    store: &dyn MetadataStore,
    key: &PipelineKey,
    mode: DecodeMode,
) -> Result<Vec<BuildSummary>, StoreError> {
    let children = match store.list_dir(&paths::builds_path(key)).await {
        Ok(children) => children,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut summaries = Vec::with_capacity(children.len());
    for child in children.iter().filter(|c| c.dir) {
        let Ok(number) = paths::leaf(&child.key).parse::<u64>() else {
            tracing::warn!("Skipping unexpected entry {} under builds", child.key);
            continue;
        };
        summaries.push(read_summary(store, &child.key, number, mode).await?);
    }
    summaries.sort_by_key(|s| s.number);

    Ok(summaries)
}

async fn read_summary(
    store: &dyn MetadataStore,
    path: &str,
    number: u64,
    mode: DecodeMode,
) -> Result<BuildSummary, StoreError> {
    let fields = FieldReader::new(store, path, mode);

    Ok(BuildSummary {
        id: fields.string(ID).await?,
        number: read_number(&fields, number).await?,
        status: fields.status(STATUS).await?,
        created: fields.int(CREATED).await?,
        started: fields.int(STARTED).await?,
        finished: fields.int(FINISHED).await?,
        branch: fields.string(BRANCH).await?,
        commit: fields.string(COMMIT).await?,
        author: fields.string(AUTHOR).await?,
    })
}

/// The stored number, or the one from the path when the field is unset.
async fn read_number(fields: &FieldReader<'_>, from_path: u64) -> Result<u64, StoreError> {
    let stored: u64 = fields.unsigned(NUMBER).await?;
    Ok(if stored == 0 { from_path } else { stored })
}
