//! Polarion work item conversion, URIs and Lucene queries.

use serde_json::{json, Map, Value};

use super::soap::{Node, XmlElement};
use crate::domain::models::ItemQuery;

const URI_PREFIX: &str = "subterra:";

/// Work item fields sent as `<id>` enum references.
const ENUM_FIELDS: &[&str] = &["status", "priority", "severity", "resolution", "type"];

/// Work item fields sent as plain child elements.
const TEXT_FIELDS: &[&str] = &[
    "title",
    "dueDate",
    "initialEstimate",
    "remainingEstimate",
    "plannedStart",
    "plannedEnd",
];

/// Prefix that forces a path into `customFields`.
const CUSTOM_PREFIX: &str = "customFields.";

/// Fields listed by `get_fields` besides the project's custom fields.
pub const BUILTIN_FIELDS: &[(&str, &str, bool)] = &[
    ("title", "string", true),
    ("description", "text", false),
    ("status", "enum", true),
    ("priority", "enum", false),
    ("severity", "enum", false),
    ("resolution", "enum", false),
    ("assignee", "user", false),
    ("dueDate", "date", false),
];

/// URI of work item `id` in `project`; ids that are already URIs pass
/// through unchanged.
pub fn work_item_uri(project: &str, id: &str) -> String {
    if id.starts_with(URI_PREFIX) {
        id.to_string()
    } else {
        format!("subterra:data-service:objects:/default/{project}${{WorkItem}}{id}")
    }
}

/// Work item id from its URI.
pub fn id_from_uri(uri: &str) -> &str {
    uri.rsplit_once('}').map_or(uri, |(_, id)| id)
}

/// Whether `id` is a full work item URI.
pub fn is_uri(id: &str) -> bool {
    id.starts_with(URI_PREFIX)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Children of a `workItem` element for `payload`.
///
/// `type`, when given, is prepended as an enum reference.
pub fn work_item_nodes(payload: &Map<String, Value>, item_type: Option<&str>) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut custom = Vec::new();
    if let Some(item_type) = item_type {
        nodes.push(Node::enum_id("type", item_type));
    }

    for (path, value) in payload {
        let text = scalar_text(value);
        if let Some(key) = path.strip_prefix(CUSTOM_PREFIX) {
            custom.push(custom_node(key, text));
        } else if path == "description" {
            nodes.push(Node::parent(
                "description",
                vec![
                    Node::text("type", "text/plain"),
                    Node::text("content", text),
                ],
            ));
        } else if ENUM_FIELDS.contains(&path.as_str()) {
            if item_type.is_some() && path == "type" {
                continue;
            }
            nodes.push(Node::enum_id(path.as_str(), text));
        } else if TEXT_FIELDS.contains(&path.as_str()) {
            nodes.push(Node::text(path.as_str(), text));
        } else {
            custom.push(custom_node(path, text));
        }
    }

    if !custom.is_empty() {
        nodes.push(Node::parent("customFields", custom));
    }
    nodes
}

fn custom_node(key: &str, value: String) -> Node {
    Node::parent(
        "Custom",
        vec![Node::text("key", key), Node::text("value", value)],
    )
}

/// Generic XML-to-JSON conversion: leaves become strings, repeated
/// children become arrays.
pub fn element_to_json(element: &XmlElement) -> Value {
    if element.children.is_empty() {
        return Value::String(element.text.clone());
    }
    let mut map = Map::new();
    for child in &element.children {
        let value = element_to_json(child);
        match map.get_mut(&child.name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(child.name.clone(), value);
            }
        }
    }
    Value::Object(map)
}

fn enum_text<'a>(item: &'a XmlElement, name: &str) -> Option<&'a str> {
    item.child(name).and_then(|e| e.child_text("id"))
}

fn item_id(item: &XmlElement) -> Option<String> {
    item.child_text("id")
        .map(str::to_string)
        .or_else(|| item.attr("uri").map(|u| id_from_uri(u).to_string()))
}

/// Normalized view of a `WorkItem` element.
pub fn work_item_view(item: &XmlElement) -> Value {
    let custom: Map<String, Value> = item
        .child("customFields")
        .map(|cf| {
            cf.children_named("Custom")
                .filter_map(|c| {
                    let key = c.child_text("key")?;
                    let value = c.child("value").map_or(Value::Null, element_to_json);
                    Some((key.to_string(), value))
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "id": item_id(item),
        "uri": item.attr("uri"),
        "title": item.child_text("title"),
        "type": enum_text(item, "type"),
        "status": enum_text(item, "status"),
        "priority": enum_text(item, "priority"),
        "description": item.child("description").and_then(|d| d.child_text("content")),
        "project": enum_text(item, "project"),
        "author": enum_text(item, "author"),
        "created": item.child_text("created"),
        "updated": item.child_text("updated"),
        "custom_fields": custom,
    })
}

/// Condensed representation used in query results.
pub fn summary_view(item: &XmlElement) -> Value {
    json!({
        "id": item_id(item),
        "title": item.child_text("title"),
        "type": enum_text(item, "type"),
        "status": enum_text(item, "status"),
        "created": item.child_text("created"),
        "updated": item.child_text("updated"),
    })
}

/// `linkedWorkItems` of a work item, normalized.
pub fn links(item: &XmlElement) -> Vec<Value> {
    item.child("linkedWorkItems")
        .map(|linked| {
            linked
                .children_named("LinkedWorkItem")
                .map(|l| {
                    let uri = l.child_text("workItemURI").or_else(|| l.attr("uri"));
                    json!({
                        "role": enum_text(l, "role"),
                        "uri": uri,
                        "target_id": uri.map(id_from_uri),
                        "suspect": l.child_text("suspect") == Some("true"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `attachments` of a work item, normalized.
pub fn attachments(item: &XmlElement) -> Vec<Value> {
    item.child("attachments")
        .map(|all| {
            all.children_named("Attachment")
                .map(|a| {
                    json!({
                        "id": a.child_text("id"),
                        "filename": a.child_text("fileName"),
                        "title": a.child_text("title"),
                        "size": a.child_text("length").and_then(|n| n.parse::<u64>().ok()),
                        "url": a.child_text("url"),
                        "updated": a.child_text("updated"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Escape a Lucene term.
pub fn lucene_term(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(
            ch,
            '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~'
                | '*' | '?' | ':' | '\\' | '/'
        ) || ch.is_whitespace()
        {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Quote a Lucene phrase.
pub fn lucene_phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Compile a structured query into Lucene.
pub fn build_lucene(project: &str, query: &ItemQuery) -> String {
    let mut clauses = vec![format!("project.id:{}", lucene_term(project))];
    if let Some(item_type) = &query.item_type {
        clauses.push(format!("type:{}", lucene_term(item_type)));
    }
    if let Some(status) = &query.status {
        clauses.push(format!("status:{}", lucene_term(status)));
    }
    if let Some(text) = &query.text_search {
        clauses.push(format!("title:{}", lucene_phrase(text)));
    }
    clauses.join(" AND ")
}
