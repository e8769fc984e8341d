//! Azure DevOps work item tracking payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Relation type of file attachments.
pub const ATTACHED_FILE: &str = "AttachedFile";

/// A work item as returned by `_apis/wit/workitems`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Numeric id.
    pub id: u64,
    /// Revision.
    #[serde(default)]
    pub rev: Option<u64>,
    /// Field values keyed by reference name (`System.Title`).
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Relations; only present with `$expand=relations`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<Relation>>,
    /// REST URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Hypermedia links.
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
}

impl WorkItem {
    /// Browser URL, falling back to the REST URL.
    pub fn html_url(&self) -> Option<String> {
        self.links
            .as_ref()
            .and_then(|l| l.pointer("/html/href"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.url.clone())
    }

    fn field(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Condensed representation used in query results.
    pub fn summary_view(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.field("System.Title"),
            "state": self.field("System.State"),
            "work_item_type": self.field("System.WorkItemType"),
            "created": self.field("System.CreatedDate"),
            "changed": self.field("System.ChangedDate"),
        })
    }

    fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter().flatten()
    }

    /// Non-attachment relations, normalized.
    pub fn links(&self) -> Vec<Value> {
        self.relations()
            .filter(|r| r.rel != ATTACHED_FILE)
            .map(|r| {
                json!({
                    "rel": r.rel,
                    "url": r.url,
                    "target_id": last_segment(&r.url),
                    "name": r.attributes.get("name"),
                })
            })
            .collect()
    }

    /// Attachment relations, normalized.
    pub fn attachments(&self) -> Vec<Value> {
        self.relations()
            .filter(|r| r.rel == ATTACHED_FILE)
            .map(|r| {
                json!({
                    "id": last_segment(&r.url),
                    "filename": r.attributes.get("name"),
                    "size": r.attributes.get("resourceSize"),
                    "comment": r.attributes.get("comment"),
                    "url": r.url,
                })
            })
            .collect()
    }
}

/// One work item relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Relation type (`System.LinkTypes.Related`, `AttachedFile`, ...).
    pub rel: String,
    /// Target URL.
    pub url: String,
    /// Relation attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// The `{count, value}` list wrapper used by most endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueList<T> {
    /// Items.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Response of a WIQL query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResult {
    /// Matching work item references.
    #[serde(default)]
    pub work_items: Vec<WorkItemReference>,
}

/// A work item id/url pair.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemReference {
    /// Numeric id.
    pub id: u64,
}

/// Response of an attachment upload.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentReference {
    /// Attachment GUID.
    pub id: String,
    /// Download URL.
    pub url: String,
}

/// Last path segment of a URL.
pub fn last_segment(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

/// Resolve friendly link names to relation types.
///
/// Unknown names are passed through so full relation types work too.
pub fn relation_type(link_type: &str) -> &str {
    match link_type.to_lowercase().as_str() {
        "related" | "relates" => "System.LinkTypes.Related",
        "parent" => "System.LinkTypes.Hierarchy-Reverse",
        "child" => "System.LinkTypes.Hierarchy-Forward",
        "successor" => "System.LinkTypes.Dependency-Forward",
        "predecessor" => "System.LinkTypes.Dependency-Reverse",
        "tests" => "Microsoft.VSTS.Common.TestedBy-Reverse",
        "tested_by" | "tested by" => "Microsoft.VSTS.Common.TestedBy-Forward",
        _ => link_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        serde_json::from_value(json!({
            "id": 42,
            "rev": 3,
            "fields": {"System.Title": "Login", "System.State": "New", "System.WorkItemType": "Requirement"},
            "relations": [
                {"rel": "System.LinkTypes.Related", "url": "https://dev.azure.com/acme/_apis/wit/workItems/7", "attributes": {"isLocked": false}},
                {"rel": "AttachedFile", "url": "https://dev.azure.com/acme/_apis/wit/attachments/abc-123", "attributes": {"name": "design.pdf", "resourceSize": 10}}
            ],
            "_links": {"html": {"href": "https://dev.azure.com/acme/P/_workitems/edit/42"}},
            "url": "https://dev.azure.com/acme/_apis/wit/workItems/42"
        }))
        .unwrap()
    }

    #[test]
    fn test_relations_split_into_links_and_attachments() {
        let item = item();
        let links = item.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["target_id"], "7");

        let attachments = item.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0]["id"], "abc-123");
        assert_eq!(attachments[0]["filename"], "design.pdf");
    }

    #[test]
    fn test_html_url_preferred() {
        assert_eq!(
            item().html_url().as_deref(),
            Some("https://dev.azure.com/acme/P/_workitems/edit/42")
        );
    }

    #[test]
    fn test_relation_type_aliases() {
        assert_eq!(relation_type("Related"), "System.LinkTypes.Related");
        assert_eq!(relation_type("parent"), "System.LinkTypes.Hierarchy-Reverse");
        assert_eq!(
            relation_type("System.LinkTypes.Duplicate-Forward"),
            "System.LinkTypes.Duplicate-Forward"
        );
    }
}
