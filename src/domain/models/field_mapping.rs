//! Declarative field mappings and their value transforms.
//!
//! A [`FieldMapping`] is an ordered list of `source attribute -> target
//! field` entries. Targets are either a bare path string or a structured
//! `{field, transform}` object. Transforms are a closed, serializable set
//! of pure functions.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::{AlmError, AlmResult};

/// Pure value transform applied before a value is written to a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Pass the value through unchanged.
    #[default]
    Identity,
    /// Cut strings to at most `max_chars` characters.
    Truncate {
        /// Maximum number of characters kept.
        max_chars: usize,
    },
    /// Replace values found in `values`; unmatched values fall back to
    /// `default` if set, otherwise pass through.
    EnumRemap {
        /// Source value (as string) to replacement.
        values: BTreeMap<String, Value>,
        /// Replacement for unmatched values.
        #[serde(default)]
        default: Option<Value>,
    },
    /// Always produce `value`.
    Constant {
        /// The constant.
        value: Value,
    },
    /// Join an array into one string.
    Join {
        /// Separator placed between elements.
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    ", ".to_string()
}

impl Transform {
    /// Apply the transform.
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::Truncate { max_chars } => match value {
                Value::String(s) => Value::String(s.chars().take(*max_chars).collect()),
                other => other.clone(),
            },
            Self::EnumRemap { values, default } => {
                let key = scalar_to_string(value);
                key.and_then(|k| values.get(&k).cloned())
                    .or_else(|| default.clone())
                    .unwrap_or_else(|| value.clone())
            }
            Self::Constant { value } => value.clone(),
            Self::Join { separator } => match value {
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(|item| scalar_to_string(item).unwrap_or_else(|| item.to_string()))
                        .collect::<Vec<_>>()
                        .join(separator),
                ),
                other => other.clone(),
            },
        }
    }

    fn validate(&self, source: &str) -> AlmResult<()> {
        if let Self::Truncate { max_chars: 0 } = self {
            return Err(AlmError::Validation(format!(
                "mapping for '{source}': truncate max_chars must be at least 1"
            )));
        }
        Ok(())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Where a mapped value goes on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldTarget {
    /// Bare field path, identity transform.
    Path(String),
    /// Field path plus a transform.
    Structured {
        /// Backend field path.
        field: String,
        /// Transform applied before writing.
        #[serde(default)]
        transform: Transform,
    },
}

impl FieldTarget {
    /// The backend field path.
    pub fn path(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Structured { field, .. } => field,
        }
    }

    /// The transform to apply.
    pub fn transform(&self) -> &Transform {
        static IDENTITY: Transform = Transform::Identity;
        match self {
            Self::Path(_) => &IDENTITY,
            Self::Structured { transform, .. } => transform,
        }
    }
}

impl From<&str> for FieldTarget {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

/// One mapping entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    /// Internal attribute name.
    pub source: String,
    /// Backend target.
    pub target: FieldTarget,
}

/// Ordered attribute-to-field mapping.
///
/// Serialized as a map; entry order is preserved on both read and write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. A later entry for the same source replaces the
    /// earlier one in place.
    pub fn with(mut self, source: impl Into<String>, target: impl Into<FieldTarget>) -> Self {
        self.insert(source.into(), target.into());
        self
    }

    /// Append an entry with a transform.
    pub fn with_transform(
        self,
        source: impl Into<String>,
        field: impl Into<String>,
        transform: Transform,
    ) -> Self {
        self.with(
            source,
            FieldTarget::Structured {
                field: field.into(),
                transform,
            },
        )
    }

    fn insert(&mut self, source: String, target: FieldTarget) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.source == source) {
            existing.target = target;
        } else {
            self.entries.push(MappingEntry { source, target });
        }
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Whether the mapping declares no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject empty source names, empty target paths and degenerate
    /// transforms.
    pub fn validate(&self) -> AlmResult<()> {
        for entry in &self.entries {
            if entry.source.trim().is_empty() {
                return Err(AlmError::Validation(
                    "field mapping contains an empty source attribute".to_string(),
                ));
            }
            if entry.target.path().trim().is_empty() {
                return Err(AlmError::Validation(format!(
                    "mapping for '{}' has an empty target field",
                    entry.source
                )));
            }
            entry.target.transform().validate(&entry.source)?;
        }
        Ok(())
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.source, &entry.target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = FieldMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of source attribute to field path or {field, transform}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMapping, A::Error> {
                let mut mapping = FieldMapping::new();
                while let Some((source, target)) = access.next_entry::<String, FieldTarget>()? {
                    mapping.insert(source, target);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_is_char_safe() {
        let t = Transform::Truncate { max_chars: 3 };
        assert_eq!(t.apply(&json!("héllo")), json!("hél"));
        assert_eq!(t.apply(&json!("ab")), json!("ab"));
        assert_eq!(t.apply(&json!(12345)), json!(12345));
    }

    #[test]
    fn test_enum_remap() {
        let t: Transform = serde_json::from_value(json!({
            "kind": "enum_remap",
            "values": {"high": "Critical", "1": "Blocker"},
            "default": "Medium"
        }))
        .unwrap();
        assert_eq!(t.apply(&json!("high")), json!("Critical"));
        assert_eq!(t.apply(&json!(1)), json!("Blocker"));
        assert_eq!(t.apply(&json!("other")), json!("Medium"));
    }

    #[test]
    fn test_enum_remap_without_default_passes_through() {
        let t = Transform::EnumRemap {
            values: BTreeMap::new(),
            default: None,
        };
        assert_eq!(t.apply(&json!("low")), json!("low"));
    }

    #[test]
    fn test_join_and_constant() {
        let join: Transform = serde_json::from_value(json!({"kind": "join"})).unwrap();
        assert_eq!(
            join.apply(&json!(["ISO_13485", "IEC_62304"])),
            json!("ISO_13485, IEC_62304")
        );
        let constant = Transform::Constant {
            value: json!("Requirement"),
        };
        assert_eq!(constant.apply(&json!("anything")), json!("Requirement"));
    }

    #[test]
    fn test_mapping_preserves_order_from_yaml() {
        let yaml = r"
text: description
title: summary
std_tags:
  field: labels
  transform:
    kind: identity
";
        let mapping: FieldMapping = serde_yaml::from_str(yaml).unwrap();
        let sources: Vec<&str> = mapping.entries().iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["text", "title", "std_tags"]);
        assert_eq!(mapping.entries()[2].target.path(), "labels");
    }

    #[test]
    fn test_mapping_serializes_as_map() {
        let mapping = FieldMapping::new()
            .with("title", "summary")
            .with_transform("text", "description", Transform::Truncate { max_chars: 10 });
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["title"], "summary");
        assert_eq!(json["text"]["field"], "description");
        assert_eq!(json["text"]["transform"]["kind"], "truncate");
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        let mapping = FieldMapping::new().with("title", "");
        assert!(matches!(mapping.validate(), Err(AlmError::Validation(_))));

        let zero = FieldMapping::new().with_transform(
            "text",
            "description",
            Transform::Truncate { max_chars: 0 },
        );
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_duplicate_source_replaces_in_place() {
        let mapping = FieldMapping::new()
            .with("title", "summary")
            .with("text", "description")
            .with("title", "System.Title");
        assert_eq!(mapping.entries().len(), 2);
        assert_eq!(mapping.entries()[0].target.path(), "System.Title");
    }
}
