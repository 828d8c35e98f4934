//! Pipeline domain types
//!
//! The pipeline lifecycle lives outside this crate. Only the fields consumed by
//! build persistence and notification are modelled here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::build::BuildSummary;
use crate::domain::stage::Stage;
use crate::domain::vars::Vars;

/// Identifies a pipeline by its repository coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineKey {
    pub owner: String,
    pub repo: String,
}

impl PipelineKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Whether both segments are usable as single path components.
    pub fn is_valid(&self) -> bool {
        !self.owner.is_empty()
            && !self.repo.is_empty()
            && !self.owner.contains('/')
            && !self.repo.contains('/')
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Pipeline definition as read by this crate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub key: PipelineKey,
    pub vars: Vars,
    /// Names of the secrets this pipeline may read
    pub secrets: Vec<String>,
    pub notifiers: Vec<NotifierConfig>,
    /// Stage templates copied into every new build
    pub stages: Vec<Stage>,
    pub latest_build: Option<BuildSummary>,
}

/// Notifier configuration attached to a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Namespace the notifier's secrets are read from
    #[serde(default)]
    pub namespace: String,
    /// Metadata key -> secret key
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}
