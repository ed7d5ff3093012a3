//! Cross-client field diffing.
//!
//! Records are flattened into `field → JSON value` maps and compared by
//! stringified value, so new fields introduced by client or chain upgrades
//! diff correctly without this module knowing about them. A field absent
//! from one client compares equal to absent elsewhere but distinct from any
//! present value.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use txscope_types::{StructuredTx, TransactionMetadata};

/// A flattened record: field name to JSON value.
pub type FieldMap = BTreeMap<String, Value>;

/// Per-client values of one diverging field.
pub type FieldValues = BTreeMap<String, Value>;

/// Outcome of a cross-client comparison over one flattened section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffFields {
    /// Fields whose stringified value agrees across all clients, with the
    /// value taken from the primary client.
    pub common: FieldMap,
    /// Fields with diverging values, with every client's value.
    pub diff: BTreeMap<String, FieldValues>,
}

/// Flattens a structured transaction, if present.
pub fn flatten_tx(tx: Option<&StructuredTx>) -> FieldMap {
    tx.map(flatten).unwrap_or_default()
}

/// Flattens lifecycle metadata.
pub fn flatten_metadata(metadata: &TransactionMetadata) -> FieldMap {
    flatten(metadata)
}

fn flatten<T: serde::Serialize>(value: &T) -> FieldMap {
    match serde_json::to_value(value) {
        Ok(Value::Object(object)) => object_to_map(object),
        _ => FieldMap::new(),
    }
}

fn object_to_map(object: Map<String, Value>) -> FieldMap {
    object.into_iter().collect()
}

/// Compares flattened records across clients.
///
/// For every field present in any client, the set of distinct stringified
/// values decides the classification: cardinality ≤ 1 is common, anything
/// else is a diff carrying the full per-client mapping (absent values as
/// JSON null). Common values come from `primary` when it has a record,
/// otherwise from the first client that does.
pub fn compute_diff(all: &BTreeMap<String, FieldMap>, primary: &str) -> DiffFields {
    let mut fields: BTreeSet<&String> = BTreeSet::new();
    for map in all.values() {
        fields.extend(map.keys());
    }

    let mut result = DiffFields::default();
    for field in fields {
        let mut values = FieldValues::new();
        let mut distinct: BTreeSet<String> = BTreeSet::new();
        for (client, map) in all {
            let value = map.get(field).cloned().unwrap_or(Value::Null);
            distinct.insert(value.to_string());
            values.insert(client.clone(), value);
        }

        if distinct.len() > 1 {
            result.diff.insert(field.clone(), values);
        } else {
            let source = all
                .get(primary)
                .and_then(|map| map.get(field))
                .or_else(|| all.values().find_map(|map| map.get(field)));
            if let Some(value) = source {
                result.common.insert(field.clone(), value.clone());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> FieldMap {
        pairs.iter().map(|(field, value)| (field.to_string(), value.clone())).collect()
    }

    #[test]
    fn identical_maps_are_all_common() {
        let mut all = BTreeMap::new();
        all.insert("alpha".to_string(), map(&[("gas", json!(21000)), ("nonce", json!(7))]));
        all.insert("beta".to_string(), map(&[("gas", json!(21000)), ("nonce", json!(7))]));

        let result = compute_diff(&all, "alpha");
        assert!(result.diff.is_empty());
        assert_eq!(result.common["gas"], json!(21000));
        assert_eq!(result.common["nonce"], json!(7));
    }

    #[test]
    fn diverging_field_carries_every_client_value() {
        let mut all = BTreeMap::new();
        all.insert("alpha".to_string(), map(&[("gas", json!("21000")), ("nonce", json!(7))]));
        all.insert("beta".to_string(), map(&[("gas", json!("30000")), ("nonce", json!(7))]));

        let result = compute_diff(&all, "alpha");
        assert_eq!(result.common.len(), 1);
        assert!(result.common.contains_key("nonce"));
        let gas = &result.diff["gas"];
        assert_eq!(gas["alpha"], json!("21000"));
        assert_eq!(gas["beta"], json!("30000"));
    }

    #[test]
    fn absent_field_diffs_against_present() {
        let mut all = BTreeMap::new();
        all.insert("alpha".to_string(), map(&[("max_fee_per_blob_gas", json!("777"))]));
        all.insert("beta".to_string(), FieldMap::new());

        let result = compute_diff(&all, "alpha");
        let values = &result.diff["max_fee_per_blob_gas"];
        assert_eq!(values["alpha"], json!("777"));
        assert_eq!(values["beta"], Value::Null);
    }

    #[test]
    fn absent_everywhere_but_one_equal_pair_is_common() {
        let mut all = BTreeMap::new();
        all.insert("alpha".to_string(), map(&[("status", json!("pending"))]));
        all.insert("beta".to_string(), map(&[("status", json!("pending"))]));

        let result = compute_diff(&all, "gamma");
        // Primary has no record; the value still comes from a present client.
        assert_eq!(result.common["status"], json!("pending"));
    }

    #[test]
    fn union_of_common_and_diff_covers_every_field() {
        let mut all = BTreeMap::new();
        all.insert(
            "alpha".to_string(),
            map(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]),
        );
        all.insert(
            "beta".to_string(),
            map(&[("a", json!(1)), ("b", json!(9)), ("d", json!(4))]),
        );

        let result = compute_diff(&all, "alpha");
        let mut covered: BTreeSet<&String> = result.common.keys().collect();
        covered.extend(result.diff.keys());

        let mut expected: BTreeSet<&String> = BTreeSet::new();
        for map in all.values() {
            expected.extend(map.keys());
        }
        assert_eq!(covered, expected);
        for field in result.common.keys() {
            assert!(!result.diff.contains_key(field), "field {field} in both sections");
        }
    }

    #[test]
    fn string_and_number_do_not_compare_equal() {
        let mut all = BTreeMap::new();
        all.insert("alpha".to_string(), map(&[("gas", json!(21000))]));
        all.insert("beta".to_string(), map(&[("gas", json!("21000"))]));

        let result = compute_diff(&all, "alpha");
        assert!(result.diff.contains_key("gas"));
    }

    #[test]
    fn flatten_skips_omitted_optionals() {
        let metadata = TransactionMetadata::default();
        let flattened = flatten_metadata(&metadata);
        assert!(flattened.contains_key("status"));
        assert!(!flattened.contains_key("time_pending"));
        assert!(!flattened.contains_key("time_mined"));
    }
}
