//! Field mapping engine.
//!
//! Turns an attribute map into a backend-field-keyed payload, reads
//! backend items back into attribute names, and computes change sets
//! between two mapped payloads.

use serde_json::{Map, Value};

use crate::domain::models::{AdapterKind, FieldMapping, Transform};

/// Characters of a record's text used as its title when it has none.
pub const TITLE_FALLBACK_CHARS: usize = 100;

fn non_blank<'a>(source: &'a Map<String, Value>, attribute: &str) -> Option<&'a Value> {
    source
        .get(attribute)
        .filter(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
}

/// Map a record's attributes for `backend`.
///
/// `title` and `text` always go to the backend's title and description
/// fields; a record without a title uses the first
/// [`TITLE_FALLBACK_CHARS`] characters of its text. Entries of `mapping`
/// are applied afterwards and win on a shared target field.
pub fn map_record(
    source: &Map<String, Value>,
    backend: AdapterKind,
    mapping: &FieldMapping,
) -> Map<String, Value> {
    let mut mapped = Map::new();
    let text = non_blank(source, "text");
    let title = non_blank(source, "title").cloned().or_else(|| {
        text.map(|t| {
            Transform::Truncate {
                max_chars: TITLE_FALLBACK_CHARS,
            }
            .apply(t)
        })
    });
    if let Some(title) = title {
        mapped.insert(backend.title_field().to_string(), title);
    }
    if let Some(text) = text {
        mapped.insert(backend.description_field().to_string(), text.clone());
    }
    mapped.extend(map_fields(source, mapping));
    mapped
}

/// Map `source` through `mapping`.
///
/// Entries whose source attribute is absent (or null) are skipped, so the
/// payload never carries null writes for unset attributes.
pub fn map_fields(source: &Map<String, Value>, mapping: &FieldMapping) -> Map<String, Value> {
    let mut mapped = Map::new();
    for entry in mapping.entries() {
        let Some(value) = source.get(&entry.source) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        mapped.insert(
            entry.target.path().to_string(),
            entry.target.transform().apply(value),
        );
    }
    mapped
}

/// Read backend values back under their attribute names.
///
/// Target paths are resolved as exact keys first, then as dotted paths into
/// nested objects. Transforms are not inverted.
pub fn read_back(remote: &Map<String, Value>, mapping: &FieldMapping) -> Map<String, Value> {
    let mut attributes = Map::new();
    for entry in mapping.entries() {
        if let Some(value) = lookup_path(remote, entry.target.path()) {
            attributes.insert(entry.source.clone(), value.clone());
        }
    }
    attributes
}

fn lookup_path<'a>(remote: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = remote.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = remote.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Equality used for change detection. Numbers compare by value, so `1`
/// and `1.0` are equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Fields of `current` that are missing from `baseline` or differ from it.
pub fn changed_fields(
    current: &Map<String, Value>,
    baseline: &Map<String, Value>,
) -> Map<String, Value> {
    current
        .iter()
        .filter(|(field, value)| {
            baseline
                .get(*field)
                .is_none_or(|old| !values_equal(value, old))
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Transform;
    use serde_json::json;

    fn source() -> Map<String, Value> {
        json!({
            "req_id": "R1",
            "title": "Validate login",
            "text": "The system shall validate credentials.",
            "std_tags": ["ISO_13485"],
            "owner": null
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_map_fields_basic() {
        let mapping = FieldMapping::new()
            .with("title", "summary")
            .with("text", "description");
        let mapped = map_fields(&source(), &mapping);
        assert_eq!(
            Value::Object(mapped),
            json!({"summary": "Validate login", "description": "The system shall validate credentials."})
        );
    }

    #[test]
    fn test_map_fields_skips_absent_and_null() {
        let mapping = FieldMapping::new()
            .with("title", "summary")
            .with("priority", "priority.name")
            .with("owner", "assignee");
        let mapped = map_fields(&source(), &mapping);
        assert_eq!(mapped.len(), 1);
        assert!(!mapped.contains_key("priority.name"));
        assert!(!mapped.contains_key("assignee"));
    }

    #[test]
    fn test_map_fields_applies_transform() {
        let mapping = FieldMapping::new()
            .with_transform("title", "summary", Transform::Truncate { max_chars: 8 })
            .with_transform(
                "std_tags",
                "labels",
                Transform::Join {
                    separator: ";".into(),
                },
            );
        let mapped = map_fields(&source(), &mapping);
        assert_eq!(mapped["summary"], json!("Validate"));
        assert_eq!(mapped["labels"], json!("ISO_13485"));
    }

    #[test]
    fn test_map_fields_keeps_mapping_order() {
        let mapping = FieldMapping::new()
            .with("title", "System.Title")
            .with("text", "Microsoft.VSTS.Common.AcceptanceCriteria");
        let mapped = map_fields(&source(), &mapping);
        let keys: Vec<&str> = mapped.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["System.Title", "Microsoft.VSTS.Common.AcceptanceCriteria"]
        );
    }

    #[test]
    fn test_map_record_writes_title_and_description_by_default() {
        let mapped = map_record(&source(), AdapterKind::AzureDevOps, &FieldMapping::new());
        assert_eq!(
            Value::Object(mapped),
            json!({
                "System.Title": "Validate login",
                "System.Description": "The system shall validate credentials."
            })
        );
    }

    #[test]
    fn test_map_record_title_falls_back_to_text() {
        let long_text = "x".repeat(250);
        let source = json!({"title": "  ", "text": long_text});
        let mapped = map_record(
            source.as_object().unwrap(),
            AdapterKind::Polarion,
            &FieldMapping::new(),
        );
        assert_eq!(mapped["title"], json!("x".repeat(TITLE_FALLBACK_CHARS)));
        assert_eq!(mapped["description"], json!(long_text));
    }

    #[test]
    fn test_map_record_mapping_overrides_defaults() {
        let mapping = FieldMapping::new()
            .with_transform("title", "summary", Transform::Truncate { max_chars: 8 })
            .with("std_tags", "labels");
        let mapped = map_record(&source(), AdapterKind::Jira, &mapping);
        assert_eq!(mapped["summary"], json!("Validate"));
        assert_eq!(mapped["description"], json!("The system shall validate credentials."));
        assert_eq!(mapped["labels"], json!(["ISO_13485"]));
        assert_eq!(mapped.len(), 3);
    }

    #[test]
    fn test_map_record_without_title_or_text_is_empty() {
        let source = json!({"req_id": "R9"});
        assert!(map_record(source.as_object().unwrap(), AdapterKind::Jira, &FieldMapping::new())
            .is_empty());
    }

    #[test]
    fn test_read_back_resolves_dotted_paths() {
        let mapping = FieldMapping::new()
            .with("title", "summary")
            .with("priority", "priority.name")
            .with("state", "System.State");
        let remote = json!({
            "summary": "Validate login",
            "priority": {"name": "High"},
            "System.State": "Active"
        });
        let attrs = read_back(remote.as_object().unwrap(), &mapping);
        assert_eq!(attrs["title"], json!("Validate login"));
        assert_eq!(attrs["priority"], json!("High"));
        assert_eq!(attrs["state"], json!("Active"));
    }

    #[test]
    fn test_values_equal_normalizes_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!values_equal(&json!("1"), &json!(1)));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_changed_fields() {
        let current = json!({"summary": "New", "description": "Same", "points": 3});
        let baseline = json!({"summary": "Old", "description": "Same", "points": 3.0});
        let changed = changed_fields(current.as_object().unwrap(), baseline.as_object().unwrap());
        assert_eq!(Value::Object(changed), json!({"summary": "New"}));

        let no_baseline = changed_fields(current.as_object().unwrap(), &Map::new());
        assert_eq!(no_baseline.len(), 3);
    }
}
