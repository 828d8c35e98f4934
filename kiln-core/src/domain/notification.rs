//! Notification payload types

use serde::{Deserialize, Serialize};

use crate::domain::build::BuildStatus;

/// Name and status of one stage, in stage order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub name: String,
    pub status: BuildStatus,
}

/// Everything a notifier receives about a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// `owner/repo` of the pipeline
    pub pipeline: String,
    pub build_number: u64,
    pub build_status: BuildStatus,
    pub stages: Vec<StageStatus>,
}
