//! Sparse dotted-path override leaf, patch ops and base-vs-current diffing.

mod store;

use std::borrow::Cow;
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use store::{LayerOverrideStore, OverridePaths};

const OVERRIDES_PREFIX: &str = "overrides.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("patch op has an empty path")]
    EmptyPath,
    #[error("patch op path {path:?} has an empty segment")]
    EmptySegment { path: String },
    #[error("set op for {path:?} is missing a value")]
    MissingValue { path: String },
}

pub type OverrideResult<T> = std::result::Result<T, OverrideError>;

/// Map of dotted path to JSON value. A missing key means "use the computed default".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideLeaf(BTreeMap<String, Value>);

impl OverrideLeaf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) {
        self.0.insert(path.into(), value);
    }

    pub fn unset(&mut self, path: &str) -> Option<Value> {
        self.0.remove(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Expands dotted paths into nested objects for the save call.
    ///
    /// `overrides.bg_pan_zoom.zoom` becomes `{"bg_pan_zoom": {"zoom": ...}}`. When a
    /// path collides with a scalar written by a shorter path, the deeper path wins.
    pub fn expand_nested(&self) -> Value {
        let mut root = Map::new();
        for (path, value) in &self.0 {
            let trimmed = path.strip_prefix(OVERRIDES_PREFIX).unwrap_or(path);
            let mut segments = trimmed.split('.').peekable();
            let mut cursor = &mut root;
            while let Some(segment) = segments.next() {
                if segments.peek().is_none() {
                    cursor.insert(segment.to_string(), value.clone());
                    break;
                }
                let entry = cursor
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                let Some(map) = entry.as_object_mut() else {
                    break;
                };
                cursor = map;
            }
        }
        Value::Object(root)
    }
}

impl FromIterator<(String, Value)> for OverrideLeaf {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a OverrideLeaf {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Atomic set/unset instruction. Produced by gesture diffing and by the suggestion
/// service; both are consumed identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Set {
        path: String,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Unset {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl PatchOp {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Set {
            path: path.into(),
            value: Some(value),
            reason: None,
        }
    }

    pub fn unset(path: impl Into<String>) -> Self {
        Self::Unset {
            path: path.into(),
            reason: None,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Unset { path, .. } => path,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Set { reason, .. } | Self::Unset { reason, .. } => reason.as_deref(),
        }
    }

    pub fn validate(&self) -> OverrideResult<()> {
        let path = self.path();
        if path.is_empty() {
            return Err(OverrideError::EmptyPath);
        }
        if path.split('.').any(str::is_empty) {
            return Err(OverrideError::EmptySegment {
                path: path.to_string(),
            });
        }
        if let Self::Set { value: None, .. } = self {
            return Err(OverrideError::MissingValue {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn apply_to(&self, leaf: &mut OverrideLeaf) {
        match self {
            Self::Set {
                path,
                value: Some(value),
                ..
            } => leaf.set(path.clone(), value.clone()),
            Self::Set { value: None, .. } => {}
            Self::Unset { path, .. } => {
                leaf.unset(path);
            }
        }
    }
}

/// Applies `ops` in order. Returns the input untouched (borrowed) when the result is
/// deep-equal to it so callers can skip redundant history pushes and re-renders.
pub fn apply_ops<'a>(
    leaf: &'a OverrideLeaf,
    ops: &[PatchOp],
) -> OverrideResult<Cow<'a, OverrideLeaf>> {
    for op in ops {
        op.validate()?;
    }
    let mut next = leaf.clone();
    for op in ops {
        op.apply_to(&mut next);
    }
    if &next == leaf {
        Ok(Cow::Borrowed(leaf))
    } else {
        Ok(Cow::Owned(next))
    }
}

/// Minimal ops turning `base` into `current`, ordered by path.
pub fn diff(base: &OverrideLeaf, current: &OverrideLeaf) -> Vec<PatchOp> {
    let keys: BTreeSet<&String> = base.0.keys().chain(current.0.keys()).collect();
    keys.into_iter()
        .filter_map(|path| match (base.get(path), current.get(path)) {
            (Some(before), Some(after)) if before == after => None,
            (_, Some(after)) => Some(PatchOp::set(path.clone(), after.clone())),
            (Some(_), None) => Some(PatchOp::unset(path.clone())),
            (None, None) => None,
        })
        .collect()
}

/// Whether a merge-patch value means "remove the override".
pub(crate) fn is_unset_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// JSON number for a finite float; non-finite values are treated as unset.
pub(crate) fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(entries: &[(&str, Value)]) -> OverrideLeaf {
        entries
            .iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn apply_ops_returns_borrowed_when_nothing_changes() {
        let base = leaf(&[("overrides.portrait.zoom", json!(1.2))]);
        let ops = vec![
            PatchOp::set("overrides.portrait.zoom", json!(1.2)),
            PatchOp::unset("overrides.missing"),
        ];
        let result = apply_ops(&base, &ops).expect("ops are valid");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn apply_ops_sets_and_unsets_in_order() {
        let base = leaf(&[("overrides.a", json!(1)), ("overrides.b", json!("x"))]);
        let ops = vec![
            PatchOp::set("overrides.c", json!({"nested": true})),
            PatchOp::unset("overrides.a"),
            PatchOp::set("overrides.b", json!("y")),
        ];
        let result = apply_ops(&base, &ops).expect("ops are valid").into_owned();
        assert_eq!(
            result,
            leaf(&[
                ("overrides.b", json!("y")),
                ("overrides.c", json!({"nested": true})),
            ])
        );
    }

    #[test]
    fn apply_ops_rejects_malformed_ops_without_partial_application() {
        let base = OverrideLeaf::new();
        let ops = vec![
            PatchOp::set("overrides.a", json!(1)),
            PatchOp::set("overrides..b", json!(2)),
        ];
        let err = apply_ops(&base, &ops).expect_err("empty segment should fail");
        assert_eq!(
            err,
            OverrideError::EmptySegment {
                path: "overrides..b".to_string()
            }
        );
    }

    #[test]
    fn diff_emits_set_for_changed_and_new_keys_and_unset_for_removed() {
        let base = leaf(&[
            ("overrides.keep", json!(1)),
            ("overrides.change", json!(1)),
            ("overrides.remove", json!(1)),
        ]);
        let current = leaf(&[
            ("overrides.keep", json!(1)),
            ("overrides.change", json!(2)),
            ("overrides.add", json!([1, 2])),
        ]);
        assert_eq!(
            diff(&base, &current),
            vec![
                PatchOp::set("overrides.add", json!([1, 2])),
                PatchOp::set("overrides.change", json!(2)),
                PatchOp::unset("overrides.remove"),
            ]
        );
    }

    #[test]
    fn diff_round_trips_through_apply_ops() {
        let cases = [
            (leaf(&[]), leaf(&[("overrides.x", json!(0.5))])),
            (leaf(&[("overrides.x", json!(0.5))]), leaf(&[])),
            (
                leaf(&[
                    ("overrides.x", json!(0.5)),
                    ("overrides.y", json!({"a": [1, {"b": null}]})),
                ]),
                leaf(&[
                    ("overrides.y", json!({"a": [1, {"b": 2}]})),
                    ("overrides.z", json!("text")),
                ]),
            ),
            (
                leaf(&[("overrides.same", json!(true))]),
                leaf(&[("overrides.same", json!(true))]),
            ),
        ];
        for (base, current) in cases {
            let ops = diff(&base, &current);
            let applied = apply_ops(&base, &ops).expect("diff ops are valid");
            assert_eq!(applied.as_ref(), &current);
        }
    }

    #[test]
    fn patch_op_wire_format_matches_suggestion_service() {
        let op: PatchOp = serde_json::from_value(json!({
            "op": "set",
            "path": "overrides.portrait.offset_x",
            "value": 0.1,
            "reason": "move face right"
        }))
        .expect("set op parses");
        assert_eq!(op.path(), "overrides.portrait.offset_x");
        assert_eq!(op.reason(), Some("move face right"));

        let unset = serde_json::to_value(PatchOp::unset("overrides.a")).expect("serializes");
        assert_eq!(unset, json!({"op": "unset", "path": "overrides.a"}));
    }

    #[test]
    fn set_op_without_value_is_rejected() {
        let op: PatchOp =
            serde_json::from_value(json!({"op": "set", "path": "overrides.a"})).expect("parses");
        assert_eq!(
            op.validate(),
            Err(OverrideError::MissingValue {
                path: "overrides.a".to_string()
            })
        );
    }

    #[test]
    fn expand_nested_strips_prefix_and_nests_segments() {
        let leaf = leaf(&[
            ("overrides.bg_pan_zoom.zoom", json!(1.5)),
            ("overrides.bg_pan_zoom.pan_x", json!(-0.2)),
            ("overrides.portrait.offset_y", json!(0.1)),
        ]);
        assert_eq!(
            leaf.expand_nested(),
            json!({
                "bg_pan_zoom": {"zoom": 1.5, "pan_x": -0.2},
                "portrait": {"offset_y": 0.1}
            })
        );
    }

    #[test]
    fn unset_values_include_null_and_empty_string() {
        assert!(is_unset_value(&Value::Null));
        assert!(is_unset_value(&json!("")));
        assert!(!is_unset_value(&json!(0)));
        assert!(!is_unset_value(&json!(false)));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }
}
