//! Read-side filters and projections.
//!
//! Matching follows document-store conventions: a condition on an array
//! field matches when any element satisfies it, and dotted paths fan out
//! through arrays of sub-documents (`params.parameter`).

use super::{Document, ID_FIELD};
use serde_json::Value;
use std::cmp::Ordering;

/// Raw filter expression over one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals value (any element for arrays).
    Eq { field: String, value: Value },
    /// Field equals any of the values.
    In { field: String, values: Vec<Value> },
    /// Field is strictly less than value (numbers or strings).
    Lt { field: String, value: Value },
    /// Field is strictly greater than value (numbers or strings).
    Gt { field: String, value: Value },
    /// Field presence check.
    Exists { field: String, exists: bool },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    /// Exact match on the document identifier.
    pub fn by_id(id: impl ToString) -> Self {
        Self::eq(ID_FIELD, id.to_string())
    }

    /// Evaluates the filter against one document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => {
                let candidates = resolve(document, field);
                if value.is_null() && candidates.is_empty() {
                    return true;
                }
                candidates.iter().any(|candidate| *candidate == value)
            }
            Self::In { field, values } => resolve(document, field)
                .iter()
                .any(|candidate| values.contains(*candidate)),
            Self::Lt { field, value } => resolve(document, field)
                .iter()
                .any(|candidate| compare(candidate, value) == Some(Ordering::Less)),
            Self::Gt { field, value } => resolve(document, field)
                .iter()
                .any(|candidate| compare(candidate, value) == Some(Ordering::Greater)),
            Self::Exists { field, exists } => !resolve(document, field).is_empty() == *exists,
            Self::And(filters) => filters.iter().all(|filter| filter.matches(document)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
            Self::Not(filter) => !filter.matches(document),
        }
    }

    /// Evaluates the filter against an array element.
    ///
    /// Scalar elements are wrapped so field-less conditions cannot match them.
    pub(crate) fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => self.matches(map),
            _ => matches!(self, Self::All),
        }
    }
}

/// Field selection applied to read results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Return whole documents.
    #[default]
    All,
    /// Return only the listed top-level fields plus the identifier.
    Include(Vec<String>),
}

impl Projection {
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn apply(&self, document: Document) -> Document {
        match self {
            Self::All => document,
            Self::Include(fields) => document
                .into_iter()
                .filter(|(key, _)| key == ID_FIELD || fields.iter().any(|field| field == key))
                .collect(),
        }
    }
}

fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(head) = segments.next() else {
        return Vec::new();
    };
    let Some(root) = document.get(head) else {
        return Vec::new();
    };

    let mut current = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => next.extend(
                    items
                        .iter()
                        .filter_map(|item| item.as_object().and_then(|map| map.get(segment))),
                ),
                _ => {}
            }
        }
        current = next;
    }

    let mut expanded = Vec::with_capacity(current.len());
    for value in current {
        if let Value::Array(items) = value {
            expanded.extend(items.iter());
        }
        expanded.push(value);
    }
    expanded
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, Projection};
    use crate::query::Document;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn eq_on_array_field_matches_any_element() {
        let document = doc(json!({"_id": "a", "tags": ["dev", "v1"]}));
        assert!(Filter::eq("tags", "dev").matches(&document));
        assert!(!Filter::eq("tags", "prod").matches(&document));
    }

    #[test]
    fn in_and_lt_follow_store_semantics() {
        let document = doc(json!({"_id": "a", "tags": ["dev"], "date": 1_000}));
        assert!(Filter::any_of("tags", ["prod", "dev"]).matches(&document));
        assert!(Filter::lt("date", 1_001).matches(&document));
        assert!(!Filter::lt("date", 1_000).matches(&document));
        assert!(!Filter::lt("date", "later").matches(&document));
    }

    #[test]
    fn dotted_path_fans_out_through_sub_documents() {
        let document = doc(json!({
            "_id": "m",
            "params": [{"parameter": "seed", "value": 41}, {"parameter": "batch", "value": 64}]
        }));
        assert!(Filter::eq("params.parameter", "batch").matches(&document));
        assert!(Filter::gt("params.value", 50).matches(&document));
        assert!(!Filter::eq("params.parameter", "epochs").matches(&document));
    }

    #[test]
    fn null_equality_matches_missing_field() {
        let document = doc(json!({"_id": "m"}));
        assert!(Filter::eq("experiment_id", Value::Null).matches(&document));
        assert!(!Filter::exists("experiment_id", true).matches(&document));
        assert!(Filter::Not(Box::new(Filter::exists("experiment_id", true))).matches(&document));
    }

    #[test]
    fn projection_keeps_identifier() {
        let document = doc(json!({"_id": "a", "name": "exp", "tags": ["x"]}));
        let projected = Projection::include(["name"]).apply(document);
        assert_eq!(projected.len(), 2);
        assert!(projected.contains_key("_id"));
        assert!(projected.contains_key("name"));
    }
}
