//! Property-based tests for field mapping invariants
//!
//! Tests the following properties:
//! 1. Skip rule: absent or null source attributes never produce a target
//! 2. Coverage: every present, non-null mapped attribute produces its target
//! 3. Baseline: a payload compared against itself has no changes
//! 4. Truncate never yields more than `max_chars` characters
//! 5. Read-back of an identity mapping returns the mapped attributes

use almsync::domain::models::Transform;
use almsync::services::field_mapper::{changed_fields, map_fields, read_back};
use almsync::FieldMapping;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Attribute names drawn from a small alphabet so mappings and sources overlap.
fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,3}").expect("Valid regex")
}

/// Leaf JSON values, including null.
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,20}".prop_map(Value::String),
    ]
}

fn source_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(name_strategy(), value_strategy(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

/// Identity mapping `attr -> F.attr` for each generated name.
fn mapping_strategy() -> impl Strategy<Value = FieldMapping> {
    prop::collection::btree_set(name_strategy(), 0..8).prop_map(|names| {
        names
            .into_iter()
            .fold(FieldMapping::new(), |m, n| {
                let target = format!("F.{n}");
                m.with(n, target.as_str())
            })
    })
}

proptest! {
    /// Property 1: no target for absent or null attributes
    #[test]
    fn proptest_skip_rule(source in source_strategy(), mapping in mapping_strategy()) {
        let payload = map_fields(&source, &mapping);
        for entry in mapping.entries() {
            let present = source.get(&entry.source).is_some_and(|v| !v.is_null());
            if !present {
                prop_assert!(!payload.contains_key(entry.target.path()));
            }
        }
        prop_assert!(payload.values().all(|v| !v.is_null()));
    }

    /// Property 2: present attributes are always mapped, unchanged
    #[test]
    fn proptest_present_attributes_are_mapped(
        source in source_strategy(),
        mapping in mapping_strategy(),
    ) {
        let payload = map_fields(&source, &mapping);
        for entry in mapping.entries() {
            if let Some(value) = source.get(&entry.source).filter(|v| !v.is_null()) {
                prop_assert_eq!(payload.get(entry.target.path()), Some(value));
            }
        }
        prop_assert!(payload.len() <= mapping.entries().len());
    }

    /// Property 3: a payload never differs from itself
    #[test]
    fn proptest_payload_equal_to_baseline_has_no_changes(
        source in source_strategy(),
        mapping in mapping_strategy(),
    ) {
        let payload = map_fields(&source, &mapping);
        prop_assert!(changed_fields(&payload, &payload).is_empty());
        prop_assert_eq!(changed_fields(&payload, &Map::new()), payload);
    }

    /// Property 4: truncate bounds the character count
    #[test]
    fn proptest_truncate_bounds_length(text in "\\PC{0,200}", max_chars in 1usize..64) {
        let out = Transform::Truncate { max_chars }.apply(&Value::String(text.clone()));
        let out = out.as_str().expect("string stays a string");
        prop_assert!(out.chars().count() <= max_chars);
        prop_assert!(text.starts_with(out));
    }

    /// Property 5: identity mappings read back to the mapped attributes
    #[test]
    fn proptest_read_back_inverts_identity_mapping(
        source in source_strategy(),
        mapping in mapping_strategy(),
    ) {
        let payload = map_fields(&source, &mapping);
        let attributes = read_back(&payload, &mapping);
        for (name, value) in &attributes {
            prop_assert_eq!(source.get(name), Some(value));
        }
        prop_assert_eq!(attributes.len(), payload.len());
    }
}
