//! Per-call project context and structured item queries.

use serde::{Deserialize, Serialize};

use super::field_mapping::FieldMapping;
use crate::domain::errors::{AlmError, AlmResult};

/// Project context passed to single-item operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Remote project key/name/id.
    #[serde(default)]
    pub project: Option<String>,
    /// When set, item data is mapped through it; otherwise data is
    /// already keyed by backend field path.
    #[serde(default)]
    pub field_mapping: Option<FieldMapping>,
}

impl ProjectConfig {
    /// Context for `project` with no mapping.
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            field_mapping: None,
        }
    }

    /// Set the field mapping.
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mapping = Some(mapping);
        self
    }

    /// The project, or a validation error if unset.
    pub fn require_project(&self) -> AlmResult<&str> {
        self.project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AlmError::Validation("Project not specified".to_string()))
    }
}

/// Structured query compiled to each backend's native query language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
    /// Restrict to one item type.
    #[serde(default, alias = "issue_type", alias = "work_item_type")]
    pub item_type: Option<String>,
    /// Restrict to one workflow state.
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text match on title/summary.
    #[serde(default)]
    pub text_search: Option<String>,
    /// Requested page size; capped by the adapter's limit.
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl ItemQuery {
    /// Effective result limit given the adapter cap.
    pub fn limit(&self, cap: usize) -> usize {
        self.max_results.map_or(cap, |n| n.min(cap)).max(1)
    }
}
