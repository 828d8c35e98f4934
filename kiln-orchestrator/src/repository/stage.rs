//! Stage Repository
//!
//! Stages live under `{build}/stages/{index}`, one key per field.

use kiln_core::domain::stage::Stage;
use kiln_core::paths;
use kiln_store::{MetadataStore, StoreError};

use super::codec::{self, DecodeMode, FieldReader};

const ID: &str = "uuid";
const INDEX: &str = "index";
const NAME: &str = "name";
const TYPE: &str = "type";
const STATUS: &str = "status";
const STARTED: &str = "started";
const FINISHED: &str = "finished";
const PARAMS: &str = "params";
const LABELS: &str = "labels";
const VARS: &str = "vars";
const ARTIFACTS: &str = "artifacts";

/// Write every field of `stage` under `stages_path`, stopping at the first failure.
pub async fn save(
    store: &dyn MetadataStore,
    stages_path: &str,
    stage: &Stage,
) -> Result<(), StoreError> {
    let path = format!("{}/{}", stages_path, stage.index);
    let key = |field: &str| codec::field_key(&path, field);

    store.put(&key(ID), &stage.id).await?;
    store.put_int(&key(INDEX), i64::from(stage.index)).await?;
    store.put(&key(NAME), &stage.name).await?;
    store.put(&key(TYPE), &stage.stage_type).await?;
    store.put(&key(STATUS), stage.status.as_str()).await?;
    store.put(&key(STARTED), &stage.started.to_string()).await?;
    store.put(&key(FINISHED), &stage.finished.to_string()).await?;

    let params = key(PARAMS);
    store.put(&params, &codec::encode_json(&params, &stage.params)?).await?;
    let labels = key(LABELS);
    store.put(&labels, &codec::encode_json(&labels, &stage.labels)?).await?;
    let vars = key(VARS);
    store.put(&vars, &codec::encode_json(&vars, &stage.vars)?).await?;
    let artifacts = key(ARTIFACTS);
    store
        .put(&artifacts, &codec::encode_json(&artifacts, &stage.artifacts)?)
        .await?;

    Ok(())
}

/// Read the stage stored at `path`
pub async fn read(
    store: &dyn MetadataStore,
    path: &str,
    mode: DecodeMode,
) -> Result<Stage, StoreError> {
    let fields = FieldReader::new(store, path, mode);

    let mut index: u32 = fields.unsigned(INDEX).await?;
    if index == 0 {
        // Older records carry the index only in their path.
        index = paths::leaf(path).parse().unwrap_or_default();
    }

    Ok(Stage {
        id: fields.string(ID).await?,
        index,
        name: fields.string(NAME).await?,
        stage_type: fields.string(TYPE).await?,
        params: fields.json(PARAMS).await?,
        labels: fields.json(LABELS).await?,
        vars: fields.json(VARS).await?,
        artifacts: fields.json(ARTIFACTS).await?,
        status: fields.status(STATUS).await?,
        started: fields.int(STARTED).await?,
        finished: fields.int(FINISHED).await?,
    })
}

/// List all stages under `stages_path`, ordered by index.
///
/// A build without a stages directory has no stages.
pub async fn list(
    store: &dyn MetadataStore,
    stages_path: &str,
    mode: DecodeMode,
) -> Result<Vec<Stage>, StoreError> {
    let children = match store.list_dir(stages_path).await {
        Ok(children) => children,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut stages = Vec::with_capacity(children.len());
    for child in children.iter().filter(|c| c.dir) {
        stages.push(read(store, &child.key, mode).await?);
    }
    stages.sort_by_key(|s| s.index);

    Ok(stages)
}

/// Find the stage at `path`, `None` if its directory is absent
pub async fn find(
    store: &dyn MetadataStore,
    path: &str,
    mode: DecodeMode,
) -> Result<Option<Stage>, StoreError> {
    if !codec::dir_exists(store, path).await? {
        return Ok(None);
    }
    read(store, path, mode).await.map(Some)
}
