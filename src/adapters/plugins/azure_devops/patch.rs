//! JSON-Patch documents and WIQL compilation.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::models::ItemQuery;
use crate::services::field_mapper::values_equal;

/// JSON-Patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Add a field or relation.
    Add,
    /// Replace an existing field.
    Replace,
}

/// One JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    /// Operation kind.
    pub op: PatchOp,
    /// Target path (`/fields/System.Title`, `/relations/-`).
    pub path: String,
    /// New value.
    pub value: Value,
}

fn field_path(field: &str) -> String {
    format!("/fields/{field}")
}

/// Patch document creating a work item with every payload field.
pub fn create_document(payload: &Map<String, Value>) -> Vec<PatchOperation> {
    payload
        .iter()
        .map(|(field, value)| PatchOperation {
            op: PatchOp::Add,
            path: field_path(field),
            value: value.clone(),
        })
        .collect()
}

/// Patch document moving `current` to `payload`.
///
/// Fields already holding the wanted value produce no operation; fields
/// present on the item are replaced, absent ones added.
pub fn update_document(
    payload: &Map<String, Value>,
    current: &Map<String, Value>,
) -> Vec<PatchOperation> {
    payload
        .iter()
        .filter_map(|(field, value)| {
            let op = match current.get(field) {
                Some(existing) if values_equal(existing, value) => return None,
                Some(_) => PatchOp::Replace,
                None => PatchOp::Add,
            };
            Some(PatchOperation {
                op,
                path: field_path(field),
                value: value.clone(),
            })
        })
        .collect()
}

/// Operation appending a relation.
pub fn add_relation(rel: &str, url: &str, attributes: Option<Value>) -> PatchOperation {
    let mut relation = serde_json::json!({ "rel": rel, "url": url });
    if let (Some(attributes), Value::Object(map)) = (attributes, &mut relation) {
        map.insert("attributes".to_string(), attributes);
    }
    PatchOperation {
        op: PatchOp::Add,
        path: "/relations/-".to_string(),
        value: relation,
    }
}

/// Quote a WIQL string literal.
pub fn wiql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Compile a structured query into WIQL.
pub fn build_wiql(project: &str, query: &ItemQuery) -> String {
    let mut clauses = vec![format!("[System.TeamProject] = {}", wiql_literal(project))];
    if let Some(item_type) = &query.item_type {
        clauses.push(format!("[System.WorkItemType] = {}", wiql_literal(item_type)));
    }
    if let Some(status) = &query.status {
        clauses.push(format!("[System.State] = {}", wiql_literal(status)));
    }
    if let Some(text) = &query.text_search {
        clauses.push(format!("[System.Title] CONTAINS {}", wiql_literal(text)));
    }
    format!(
        "SELECT [System.Id] FROM WorkItems WHERE {} ORDER BY [System.CreatedDate] DESC",
        clauses.join(" AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FieldMapping;
    use crate::services::field_mapper::map_fields;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_document_adds_every_field() {
        let doc = create_document(&map(json!({"System.Title": "T", "Custom.Risk": 3})));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            json!([
                {"op": "add", "path": "/fields/System.Title", "value": "T"},
                {"op": "add", "path": "/fields/Custom.Risk", "value": 3}
            ])
        );
    }

    #[test]
    fn test_create_document_follows_mapping_order() {
        let mapping = FieldMapping::new()
            .with("title", "System.Title")
            .with("text", "Microsoft.VSTS.Common.AcceptanceCriteria");
        let source = map(json!({"text": "Given a user", "title": "Validate login"}));
        let doc = create_document(&map_fields(&source, &mapping));
        let paths: Vec<&str> = doc.iter().map(|op| op.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/fields/System.Title",
                "/fields/Microsoft.VSTS.Common.AcceptanceCriteria"
            ]
        );
    }

    #[test]
    fn test_update_document_skips_equal_fields() {
        let payload = map(json!({
            "System.Title": "New title",
            "System.Description": "same",
            "Custom.Risk": 2,
            "Custom.Class": "B"
        }));
        let current = map(json!({
            "System.Title": "Old title",
            "System.Description": "same",
            "Custom.Risk": 2.0
        }));
        let doc = update_document(&payload, &current);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc[0].op, PatchOp::Replace);
        assert_eq!(doc[0].path, "/fields/System.Title");
        assert_eq!(doc[1].op, PatchOp::Add);
        assert_eq!(doc[1].path, "/fields/Custom.Class");
    }

    #[test]
    fn test_update_document_empty_when_nothing_changed() {
        let payload = map(json!({"System.Title": "T"}));
        assert!(update_document(&payload, &payload).is_empty());
    }

    #[test]
    fn test_build_wiql_escapes_quotes() {
        let query = ItemQuery {
            item_type: Some("Requirement".into()),
            status: None,
            text_search: Some("user's login".into()),
            max_results: None,
        };
        assert_eq!(
            build_wiql("Med Device", &query),
            "SELECT [System.Id] FROM WorkItems WHERE [System.TeamProject] = 'Med Device' \
             AND [System.WorkItemType] = 'Requirement' AND [System.Title] CONTAINS 'user''s login' \
             ORDER BY [System.CreatedDate] DESC"
        );
    }

    #[test]
    fn test_add_relation() {
        let op = add_relation("AttachedFile", "https://x/a/1", Some(json!({"comment": "c"})));
        assert_eq!(op.path, "/relations/-");
        assert_eq!(op.value["attributes"]["comment"], "c");
    }
}
