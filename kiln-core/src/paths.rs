//! Key layout
//!
//! Metadata keys are slash-delimited and never contain colons:
//!
//! ```text
//! pipelines/{owner}/{repo}                               pipeline
//! pipelines/{owner}/{repo}/builds/{number}               build
//! pipelines/{owner}/{repo}/builds/{number}/stages/{idx}  stage
//! locks/pipelines/{owner}/{repo}/builds/{number}         advisory lock
//! ```
//!
//! Artifacts and logs live in the object store under
//! `pipelines/{pipeline_id}/builds/{number}`.

use crate::domain::pipeline::PipelineKey;

pub const PIPELINE_NAMESPACE: &str = "pipelines/";
pub const LOCK_NAMESPACE: &str = "locks/";
pub const DEFAULT_ARTIFACT_BUCKET: &str = "kontinuous";

pub fn pipeline_path(key: &PipelineKey) -> String {
    format!("{}{}/{}", PIPELINE_NAMESPACE, key.owner, key.repo)
}

pub fn builds_path(key: &PipelineKey) -> String {
    format!("{}/builds", pipeline_path(key))
}

pub fn build_path(key: &PipelineKey, number: u64) -> String {
    format!("{}/{}", builds_path(key), number)
}

pub fn stages_path(key: &PipelineKey, number: u64) -> String {
    format!("{}/stages", build_path(key, number))
}

pub fn stage_path(key: &PipelineKey, number: u64, index: u32) -> String {
    format!("{}/{}", stages_path(key, number), index)
}

/// Sentinel key guarding check-then-create on a build.
///
/// Kept outside the build subtree so subtree probes and deletes never see it.
pub fn build_lock_path(key: &PipelineKey, number: u64) -> String {
    format!("{}{}", LOCK_NAMESPACE, build_path(key, number))
}

/// Object-store prefix holding a build's artifacts and logs.
pub fn artifact_prefix(pipeline_id: &str, number: u64) -> String {
    format!("{}{}/builds/{}", PIPELINE_NAMESPACE, pipeline_id, number)
}

/// Last path segment of a key.
pub fn leaf(key: &str) -> &str {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_stage_paths() {
        let key = PipelineKey::new("acme", "api");
        assert_eq!(pipeline_path(&key), "pipelines/acme/api");
        assert_eq!(build_path(&key, 12), "pipelines/acme/api/builds/12");
        assert_eq!(
            stage_path(&key, 12, 3),
            "pipelines/acme/api/builds/12/stages/3"
        );
    }

    #[test]
    fn test_lock_path_is_outside_build_subtree() {
        let key = PipelineKey::new("acme", "api");
        let lock = build_lock_path(&key, 4);
        assert_eq!(lock, "locks/pipelines/acme/api/builds/4");
        assert!(!lock.starts_with(&build_path(&key, 4)));
    }

    #[test]
    fn test_artifact_prefix() {
        assert_eq!(artifact_prefix("p-123", 9), "pipelines/p-123/builds/9");
    }

    #[test]
    fn test_leaf() {
        assert_eq!(leaf("pipelines/acme/api/builds/12"), "12");
        assert_eq!(leaf("pipelines/acme/api/builds/12/"), "12");
        assert_eq!(leaf("single"), "single");
    }
}
