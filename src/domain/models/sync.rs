//! Batch synchronization inputs and outcomes.

use serde::{Deserialize, Serialize};

use super::field_mapping::FieldMapping;
use crate::domain::errors::AlmError;

/// Per-call sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote project receiving the records (Jira project key, ADO
    /// project name, Polarion project id).
    #[serde(
        default,
        alias = "project",
        alias = "jira_project",
        alias = "ado_project",
        alias = "polarion_project"
    )]
    pub target_project: Option<String>,
    /// Remote item type; the adapter's default applies when unset.
    #[serde(default, alias = "work_item_type", alias = "issue_type")]
    pub item_type: Option<String>,
    /// Attribute-to-field mapping.
    #[serde(default)]
    pub field_mapping: FieldMapping,
}

impl SyncConfig {
    /// A config targeting `project`.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            target_project: Some(project.into()),
            ..Self::default()
        }
    }

    /// Set the item type.
    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    /// Set the field mapping.
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mapping = mapping;
        self
    }

    /// Target project, ignoring blank values.
    pub fn project(&self) -> Option<&str> {
        self.target_project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// A record that failed to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Internal record id.
    pub req_id: String,
    /// Why it failed.
    pub error: String,
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Records that ended in sync (created, updated or unchanged).
    pub synced_items: usize,
    /// Records that caused a remote create.
    pub created_items: usize,
    /// Records that caused a remote update.
    pub updated_items: usize,
    /// Per-record failures in input order.
    #[serde(default)]
    pub errors: Vec<ItemError>,
    /// Set when the batch could not start at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_error: Option<String>,
}

impl SyncResult {
    /// A batch that never started.
    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            batch_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Record a failure.
    pub fn push_error(&mut self, req_id: impl Into<String>, error: impl Into<String>) {
        self.errors.push(ItemError {
            req_id: req_id.into(),
            error: error.into(),
        });
    }

    /// True when the batch ran and some but not necessarily all records
    /// failed.
    pub fn is_partial_failure(&self) -> bool {
        self.batch_error.is_none() && !self.errors.is_empty()
    }

    /// True when the batch ran and every record synced.
    pub fn is_clean(&self) -> bool {
        self.batch_error.is_none() && self.errors.is_empty()
    }

    /// The composite failure for a batch with per-record errors.
    pub fn partial_failure(&self) -> Option<AlmError> {
        self.is_partial_failure().then(|| AlmError::PartialBatchFailure {
            failed: self.errors.len(),
            total: self.synced_items + self.errors.len(),
        })
    }
}
