//! Internal work-item records and their links to remote counterparts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::adapter::AdapterKind;

/// Link from an internal record to the remote item it was synced to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Backend holding the remote item.
    pub backend: AdapterKind,
    /// Remote identifier (Jira key, ADO integer id, Polarion work item id).
    pub remote_id: String,
    /// Remote URI, when the backend exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Mapped field values as last written to the backend.
    #[serde(default)]
    pub synced_fields: Map<String, Value>,
    /// When the remote item was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl ExternalReference {
    /// A reference with no recorded baseline.
    pub fn new(backend: AdapterKind, remote_id: impl Into<String>) -> Self {
        Self {
            backend,
            remote_id: remote_id.into(),
            uri: None,
            synced_fields: Map::new(),
            synced_at: None,
        }
    }

    /// Set the remote URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the stored baseline.
    pub fn with_synced_fields(mut self, fields: Map<String, Value>) -> Self {
        self.synced_fields = fields;
        self
    }
}

/// An internal requirement or test case.
///
/// Records are produced upstream. This crate only ever touches
/// `external_ref`, and only after a successful remote write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    /// Internal identifier.
    pub req_id: String,
    /// Short title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Classification tags (e.g. regulatory standards).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub std_tags: Vec<String>,
    /// Additional named attributes available to field mappings.
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
    /// Link to the remote counterpart once synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<ExternalReference>,
}

impl WorkItemRecord {
    /// A record with only an identifier.
    pub fn new(req_id: impl Into<String>) -> Self {
        Self {
            req_id: req_id.into(),
            title: None,
            text: None,
            std_tags: Vec::new(),
            attributes: Map::new(),
            external_ref: None,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the body text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add a classification tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.std_tags.push(tag.into());
        self
    }

    /// Add a custom attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach an existing reference.
    pub fn with_reference(mut self, reference: ExternalReference) -> Self {
        self.external_ref = Some(reference);
        self
    }

    /// Whether the record has a remote counterpart.
    pub fn is_linked(&self) -> bool {
        self.external_ref.is_some()
    }

    /// Attribute map seen by field mappings.
    ///
    /// Unset optional attributes are absent rather than null so mappings
    /// skip them.
    pub fn source_attributes(&self) -> Map<String, Value> {
        let mut source = Map::new();
        source.insert("req_id".to_string(), Value::String(self.req_id.clone()));
        if let Some(title) = &self.title {
            source.insert("title".to_string(), Value::String(title.clone()));
        }
        if let Some(text) = &self.text {
            source.insert("text".to_string(), Value::String(text.clone()));
        }
        if !self.std_tags.is_empty() {
            source.insert(
                "std_tags".to_string(),
                Value::Array(self.std_tags.iter().cloned().map(Value::String).collect()),
            );
        }
        for (key, value) in &self.attributes {
            if !value.is_null() {
                source.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        source
    }

    /// Explicitly replace the record's reference, possibly with one for a
    /// different backend. Returns the previous reference.
    pub fn remap(&mut self, reference: ExternalReference) -> Option<ExternalReference> {
        self.external_ref.replace(reference)
    }

    /// Drop the reference so the next sync creates a new remote item.
    pub fn unlink(&mut self) -> Option<ExternalReference> {
        self.external_ref.take()
    }
}
