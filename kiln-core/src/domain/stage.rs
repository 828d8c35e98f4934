//! Stage domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::build::BuildStatus;
use crate::domain::vars::Vars;

/// One step of a build, materialized from a pipeline's stage template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub id: String,
    /// 1-based position within the build, fixed at creation
    #[serde(default)]
    pub index: u32,
    pub name: String,
    /// Executor kind
    #[serde(rename = "type", default)]
    pub stage_type: String,
    /// Executor parameters (image, command, ...)
    #[serde(default)]
    pub params: Vars,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub vars: Vars,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default)]
    pub started: i64,
    #[serde(default)]
    pub finished: i64,
}

impl Stage {
    /// A bare stage template with a name and executor kind.
    pub fn template(name: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage_type: stage_type.into(),
            ..Default::default()
        }
    }
}
