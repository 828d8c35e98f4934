//! Build domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, PipelineKey};
use crate::domain::stage::Stage;

/// One numbered execution of a pipeline
///
/// Numbers are allocated by the caller before a build reaches persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub number: u64,
    pub status: BuildStatus,
    /// Unix nanoseconds, zero when unset
    pub created: i64,
    pub started: i64,
    pub finished: i64,
    pub current_stage: u32,
    pub branch: String,
    pub commit: String,
    pub author: String,
    /// Trigger type, e.g. "push"
    pub event: String,
    pub clone_url: String,
    #[serde(skip)]
    pub pipeline: PipelineKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

/// Source-control details of whatever triggered a build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildTrigger {
    pub branch: String,
    pub commit: String,
    pub author: String,
    pub event: String,
    pub clone_url: String,
}

impl Build {
    /// Prepares a new build of `pipeline` with the pipeline's stage templates.
    pub fn from_pipeline(pipeline: &Pipeline, number: u64, trigger: BuildTrigger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            number,
            status: BuildStatus::Pending,
            created: unix_nanos_now(),
            started: 0,
            finished: 0,
            current_stage: 0,
            branch: trigger.branch,
            commit: trigger.commit,
            author: trigger.author,
            event: trigger.event,
            clone_url: trigger.clone_url,
            pipeline: pipeline.key.clone(),
            stages: pipeline.stages.clone(),
        }
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary::from(self)
    }
}

/// Listing projection of a build (no stages, no clone URL)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub id: String,
    pub number: u64,
    pub status: BuildStatus,
    pub created: i64,
    pub started: i64,
    pub finished: i64,
    pub branch: String,
    pub commit: String,
    pub author: String,
}

impl From<&Build> for BuildSummary {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id.clone(),
            number: build.number,
            status: build.status,
            created: build.created,
            started: build.started,
            finished: build.finished,
            branch: build.branch.clone(),
            commit: build.commit.clone(),
            author: build.author.clone(),
        }
    }
}

/// Lifecycle state of a build or a stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[default]
    Pending,
    Running,
    Waiting,
    Success,
    Fail,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "PENDING",
            BuildStatus::Running => "RUNNING",
            BuildStatus::Waiting => "WAITING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Fail => "FAIL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Fail)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown build status: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for BuildStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BuildStatus::Pending),
            "RUNNING" => Ok(BuildStatus::Running),
            "WAITING" => Ok(BuildStatus::Waiting),
            "SUCCESS" => Ok(BuildStatus::Success),
            "FAIL" => Ok(BuildStatus::Fail),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Current time as Unix nanoseconds.
pub fn unix_nanos_now() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            BuildStatus::Pending,
            BuildStatus::Running,
            BuildStatus::Waiting,
            BuildStatus::Success,
            BuildStatus::Fail,
        ] {
            assert_eq!(status.as_str().parse::<BuildStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<BuildStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BuildStatus::Success.is_terminal());
        assert!(BuildStatus::Fail.is_terminal());
        assert!(!BuildStatus::Running.is_terminal());
        assert!(!BuildStatus::Pending.is_terminal());
    }

    #[test]
    fn test_from_pipeline_copies_stage_templates() {
        let pipeline = Pipeline {
            id: "p-1".to_string(),
            key: PipelineKey::new("acme", "api"),
            stages: vec![
                Stage::template("build", "docker_build"),
                Stage::template("test", "command"),
            ],
            ..Default::default()
        };
        let trigger = BuildTrigger {
            branch: "main".to_string(),
            event: "push".to_string(),
            ..Default::default()
        };

        let build = Build::from_pipeline(&pipeline, 7, trigger);
        assert_eq!(build.number, 7);
        assert_eq!(build.status, BuildStatus::Pending);
        assert_eq!(build.pipeline, pipeline.key);
        assert_eq!(build.branch, "main");
        assert_eq!(build.stages.len(), 2);
        assert!(build.created > 0);
        assert!(!build.id.is_empty());
    }

    #[test]
    fn test_build_json_hides_pipeline_key() {
        let build = Build {
            number: 1,
            pipeline: PipelineKey::new("acme", "api"),
            ..Default::default()
        };
        let json = serde_json::to_value(&build).unwrap();
        assert!(json.get("pipeline").is_none());
        assert!(json.get("stages").is_none());
        assert_eq!(json["status"], "PENDING");
    }
}
