//! Partial-update operators applied to one stored document.
//!
//! # Invariants
//! - Operators address top-level fields only.
//! - A failed operator leaves the document untouched: callers apply
//!   updates to a copy and persist only on success.

use super::{Document, Filter, ID_FIELD};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-native update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace a field value.
    Set { field: String, value: Value },
    /// Remove a field.
    Unset { field: String },
    /// Append one value to an array field.
    Push { field: String, value: Value },
    /// Append each value that is not already present.
    AddToSet { field: String, values: Vec<Value> },
    /// Remove every array element matching the matcher.
    Pull { field: String, matcher: ElementMatch },
}

/// Selects array elements for [`UpdateOp::Pull`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementMatch {
    /// Element equals the value.
    Equals(Value),
    /// Element equals any of the values.
    AnyOf(Vec<Value>),
    /// Sub-document element matches the filter.
    Where(Filter),
}

impl ElementMatch {
    fn matches(&self, element: &Value) -> bool {
        match self {
            Self::Equals(value) => element == value,
            Self::AnyOf(values) => values.contains(element),
            Self::Where(filter) => filter.matches_value(element),
        }
    }
}

impl UpdateOp {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn unset(field: impl Into<String>) -> Self {
        Self::Unset {
            field: field.into(),
        }
    }

    pub fn push(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Push {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn add_to_set<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::AddToSet {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pull(field: impl Into<String>, matcher: ElementMatch) -> Self {
        Self::Pull {
            field: field.into(),
            matcher,
        }
    }

    /// Target field of the operator.
    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. }
            | Self::Unset { field }
            | Self::Push { field, .. }
            | Self::AddToSet { field, .. }
            | Self::Pull { field, .. } => field,
        }
    }

    /// Operator name used in logs.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Unset { .. } => "unset",
            Self::Push { .. } => "push",
            Self::AddToSet { .. } => "add_to_set",
            Self::Pull { .. } => "pull",
        }
    }
}

/// Operator cannot be applied to the stored document shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Identifier field is immutable.
    ImmutableField(String),
    /// Array operator targets a non-array value.
    NotAnArray(String),
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImmutableField(field) => write!(f, "field `{field}` is immutable"),
            Self::NotAnArray(field) => write!(f, "field `{field}` is not an array"),
        }
    }
}

impl Error for UpdateError {}

/// Applies operators in order and reports whether the document changed.
pub fn apply_update(document: &mut Document, ops: &[UpdateOp]) -> Result<bool, UpdateError> {
    let before = document.clone();
    for op in ops {
        if op.field() == ID_FIELD {
            return Err(UpdateError::ImmutableField(ID_FIELD.to_string()));
        }
        apply_one(document, op)?;
    }
    Ok(*document != before)
}

fn apply_one(document: &mut Document, op: &UpdateOp) -> Result<(), UpdateError> {
    match op {
        UpdateOp::Set { field, value } => {
            document.insert(field.clone(), value.clone());
        }
        UpdateOp::Unset { field } => {
            document.remove(field);
        }
        UpdateOp::Push { field, value } => {
            array_entry(document, field)?.push(value.clone());
        }
        UpdateOp::AddToSet { field, values } => {
            let items = array_entry(document, field)?;
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        UpdateOp::Pull { field, matcher } => match document.get_mut(field) {
            Some(Value::Array(items)) => items.retain(|item| !matcher.matches(item)),
            Some(_) => return Err(UpdateError::NotAnArray(field.clone())),
            None => {}
        },
    }
    Ok(())
}

fn array_entry<'a>(document: &'a mut Document, field: &str) -> Result<&'a mut Vec<Value>, UpdateError> {
    let entry = document
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match entry {
        Value::Array(items) => Ok(items),
        _ => Err(UpdateError::NotAnArray(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_update, ElementMatch, UpdateError, UpdateOp};
    use crate::query::{Document, Filter};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn add_to_set_skips_present_values_and_reports_change() {
        let mut document = doc(json!({"_id": "e", "tags": ["a", "b"]}));
        let changed =
            apply_update(&mut document, &[UpdateOp::add_to_set("tags", ["b", "c"])]).unwrap();
        assert!(changed);
        assert_eq!(document["tags"], json!(["a", "b", "c"]));

        let unchanged =
            apply_update(&mut document, &[UpdateOp::add_to_set("tags", ["a"])]).unwrap();
        assert!(!unchanged);
    }

    #[test]
    fn pull_where_removes_matching_sub_documents() {
        let mut document = doc(json!({
            "_id": "m",
            "params": [{"parameter": "seed", "value": 41}, {"parameter": "batch", "value": 64}]
        }));
        let op = UpdateOp::pull(
            "params",
            ElementMatch::Where(Filter::eq("parameter", "seed")),
        );
        assert!(apply_update(&mut document, &[op.clone()]).unwrap());
        assert_eq!(document["params"], json!([{"parameter": "batch", "value": 64}]));
        assert!(!apply_update(&mut document, &[op]).unwrap());
    }

    #[test]
    fn push_creates_missing_array_and_rejects_scalars() {
        let mut document = doc(json!({"_id": "m", "name": "m1"}));
        apply_update(&mut document, &[UpdateOp::push("metrics", json!({"metric": "f1"}))])
            .unwrap();
        assert_eq!(document["metrics"], json!([{"metric": "f1"}]));

        let err = apply_update(&mut document, &[UpdateOp::push("name", "x")]).unwrap_err();
        assert_eq!(err, UpdateError::NotAnArray("name".to_string()));
    }

    #[test]
    fn identifier_cannot_be_rewritten() {
        let mut document = doc(json!({"_id": "m"}));
        let err = apply_update(&mut document, &[UpdateOp::set("_id", "other")]).unwrap_err();
        assert!(matches!(err, UpdateError::ImmutableField(_)));
    }

    #[test]
    fn set_and_unset_change_fields() {
        let mut document = doc(json!({"_id": "m", "experiment_id": "e"}));
        assert!(apply_update(&mut document, &[UpdateOp::unset("experiment_id")]).unwrap());
        assert!(!document.contains_key("experiment_id"));
        assert!(!apply_update(&mut document, &[UpdateOp::unset("experiment_id")]).unwrap());
        assert!(apply_update(&mut document, &[UpdateOp::set("description", "d")]).unwrap());
    }
}
