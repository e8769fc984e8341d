//! Jira REST API payloads and query helpers.
//!
//! Only the parts of the payloads the adapter reads are typed; everything
//! else is carried through as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::models::ItemQuery;

/// An issue as returned by `GET /issue/{key}` and `/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    /// Numeric id as a string.
    pub id: String,
    /// Issue key (e.g. "PROJ-12").
    pub key: String,
    /// REST URL of the issue.
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
    /// Raw field values.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl JiraIssue {
    fn nested_name(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
    }

    /// Condensed representation used in query results.
    pub fn summary_view(&self) -> Value {
        serde_json::json!({
            "id": self.key,
            "key": self.key,
            "summary": self.fields.get("summary").cloned().unwrap_or(Value::Null),
            "status": self.nested_name("status"),
            "issue_type": self.nested_name("issuetype"),
            "created": self.fields.get("created").cloned().unwrap_or(Value::Null),
            "updated": self.fields.get("updated").cloned().unwrap_or(Value::Null),
        })
    }

    /// Issue links, normalized to `{id, type, direction, linked_issue}`.
    pub fn links(&self) -> Vec<Value> {
        let Some(links) = self.fields.get("issuelinks").and_then(Value::as_array) else {
            return Vec::new();
        };
        links
            .iter()
            .map(|link| {
                let (direction, other) = if let Some(out) = link.get("outwardIssue") {
                    ("outward", out)
                } else {
                    ("inward", link.get("inwardIssue").unwrap_or(&Value::Null))
                };
                serde_json::json!({
                    "id": link.get("id"),
                    "type": link.pointer("/type/name"),
                    "direction": direction,
                    "linked_issue": {
                        "key": other.get("key"),
                        "summary": other.pointer("/fields/summary"),
                    },
                })
            })
            .collect()
    }

    /// Attachments, normalized.
    pub fn attachments(&self) -> Vec<Value> {
        self.fields
            .get("attachment")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(normalize_attachment).collect())
            .unwrap_or_default()
    }
}

/// Normalize an attachment object from any Jira endpoint.
pub fn normalize_attachment(raw: &Value) -> Value {
    serde_json::json!({
        "id": raw.get("id"),
        "filename": raw.get("filename"),
        "size": raw.get("size"),
        "content_type": raw.get("mimeType"),
        "created": raw.get("created"),
        "author": raw.pointer("/author/displayName"),
        "content_url": raw.get("content"),
    })
}

/// Response of `POST /issue`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    /// Numeric id.
    pub id: String,
    /// Issue key.
    pub key: String,
    /// REST URL.
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

/// Response of `POST /search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Offset of the first returned issue.
    #[serde(default)]
    pub start_at: usize,
    /// Total matches on the server.
    #[serde(default)]
    pub total: usize,
    /// The page.
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

/// Expand dotted field paths into nested objects.
///
/// `{"priority.name": "High"}` becomes `{"priority": {"name": "High"}}`.
/// Sibling paths under the same root are merged.
pub fn expand_fields(flat: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (path, value) in flat {
        insert_path(&mut out, path, value.clone());
    }
    out
}

fn insert_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Quote a JQL string literal.
pub fn jql_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Compile a structured query into JQL.
pub fn build_jql(project: &str, query: &ItemQuery) -> String {
    let mut clauses = vec![format!("project = {}", jql_literal(project))];
    if let Some(item_type) = &query.item_type {
        clauses.push(format!("issuetype = {}", jql_literal(item_type)));
    }
    if let Some(status) = &query.status {
        clauses.push(format!("status = {}", jql_literal(status)));
    }
    if let Some(text) = &query.text_search {
        clauses.push(format!("text ~ {}", jql_literal(text)));
    }
    format!("{} ORDER BY created DESC", clauses.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_fields_nests_and_merges() {
        let flat = json!({
            "summary": "Validate login",
            "priority.name": "High",
            "priority.id": "2",
            "customfield_100.value": "Class B"
        });
        let nested = expand_fields(flat.as_object().unwrap());
        assert_eq!(
            Value::Object(nested),
            json!({
                "summary": "Validate login",
                "priority": {"name": "High", "id": "2"},
                "customfield_100": {"value": "Class B"}
            })
        );
    }

    #[test]
    fn test_build_jql_escapes_literals() {
        let query = ItemQuery {
            item_type: Some("Story".into()),
            status: Some("In Progress".into()),
            text_search: Some(r#"login "admin" \ portal"#.into()),
            max_results: None,
        };
        let jql = build_jql("MED", &query);
        assert_eq!(
            jql,
            r#"project = "MED" AND issuetype = "Story" AND status = "In Progress" AND text ~ "login \"admin\" \\ portal" ORDER BY created DESC"#
        );
    }

    #[test]
    fn test_issue_links_normalized() {
        let issue: JiraIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "MED-1",
            "fields": {
                "issuelinks": [
                    {"id": "1", "type": {"name": "Relates"}, "outwardIssue": {"key": "MED-2", "fields": {"summary": "Other"}}},
                    {"id": "2", "type": {"name": "Blocks"}, "inwardIssue": {"key": "MED-3", "fields": {"summary": "Third"}}}
                ]
            }
        }))
        .unwrap();
        let links = issue.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["direction"], "outward");
        assert_eq!(links[0]["linked_issue"]["key"], "MED-2");
        assert_eq!(links[1]["direction"], "inward");
        assert_eq!(links[1]["type"], "Blocks");
    }

    #[test]
    fn test_summary_view() {
        let issue: JiraIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "MED-1",
            "fields": {"summary": "S", "status": {"name": "Open"}, "issuetype": {"name": "Story"}}
        }))
        .unwrap();
        let view = issue.summary_view();
        assert_eq!(view["key"], "MED-1");
        assert_eq!(view["status"], "Open");
        assert_eq!(view["issue_type"], "Story");
    }
}
