//! Pipeline Repository
//!
//! Read-only access to the pipeline fields build persistence depends on.
//! Pipelines are written by the pipeline lifecycle, which lives elsewhere.

use kiln_core::domain::pipeline::{Pipeline, PipelineKey};
use kiln_core::paths;
use kiln_store::{MetadataStore, StoreError};

use super::build as build_repository;
use super::codec::{self, DecodeMode, FieldReader};

const ID: &str = "uuid";
const VARS: &str = "vars";
const SECRETS: &str = "secrets";
const NOTIFIERS: &str = "notifiers";
const STAGES: &str = "stages";
const LATEST_BUILD: &str = "latest-build";

/// Find a pipeline by its repository coordinates
pub async fn find(
    store: &dyn MetadataStore,
    key: &PipelineKey,
    mode: DecodeMode,
) -> Result<Option<Pipeline>, StoreError> {
    let path = paths::pipeline_path(key);
    if !codec::dir_exists(store, &path).await? {
        return Ok(None);
    }

    let fields = FieldReader::new(store, &path, mode);
    let latest: u64 = fields.unsigned(LATEST_BUILD).await?;
    let latest_build = if latest > 0 {
        build_repository::find_summary(store, key, latest, mode).await?
    } else {
        None
    };

    Ok(Some(Pipeline {
        id: fields.string(ID).await?,
        key: key.clone(),
        vars: fields.json(VARS).await?,
        secrets: fields.json(SECRETS).await?,
        notifiers: fields.json(NOTIFIERS).await?,
        stages: fields.json(STAGES).await?,
        latest_build,
    }))
}

/// Writes the fields `find` reads back.
#[cfg(test)]
pub(crate) async fn save(store: &dyn MetadataStore, pipeline: &Pipeline) -> Result<(), StoreError> {
    let path = paths::pipeline_path(&pipeline.key);
    let key = |field: &str| codec::field_key(&path, field);

    store.put(&key(ID), &pipeline.id).await?;
    store.put(&key(VARS), &codec::encode_json(&key(VARS), &pipeline.vars)?).await?;
    store
        .put(&key(SECRETS), &codec::encode_json(&key(SECRETS), &pipeline.secrets)?)
        .await?;
    store
        .put(&key(NOTIFIERS), &codec::encode_json(&key(NOTIFIERS), &pipeline.notifiers)?)
        .await?;
    store
        .put(&key(STAGES), &codec::encode_json(&key(STAGES), &pipeline.stages)?)
        .await?;
    if let Some(latest) = &pipeline.latest_build {
        store.put(&key(LATEST_BUILD), &latest.number.to_string()).await?;
    }
    Ok(())
}
