//! Entity update kinds and their translation into store operators.

use crate::model::values::{Metric, Param};
use crate::query::{ElementMatch, Filter, UpdateOp};
use crate::repo::Collection;
use serde_json::Value;

/// Partial update requested by an entity method.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityUpdate {
    Rename(String),
    AddTags(Vec<String>),
    RemoveTags(Vec<String>),
    /// `None` removes the field.
    SetDescription(Option<String>),
    AddParam(Param),
    RemoveParam(String),
    AddMetric(Metric),
    RemoveMetric(String),
    SetConfig(Value),
    SetWeights(Value),
}

impl EntityUpdate {
    /// Name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rename(_) => "rename",
            Self::AddTags(_) => "add_tags",
            Self::RemoveTags(_) => "remove_tags",
            Self::SetDescription(_) => "set_description",
            Self::AddParam(_) => "add_param",
            Self::RemoveParam(_) => "remove_param",
            Self::AddMetric(_) => "add_metric",
            Self::RemoveMetric(_) => "remove_metric",
            Self::SetConfig(_) => "set_config",
            Self::SetWeights(_) => "set_weights",
        }
    }

    /// Whether the update exists for documents of `collection`.
    pub fn applies_to(&self, collection: Collection) -> bool {
        match self {
            Self::Rename(_) | Self::AddTags(_) | Self::RemoveTags(_) => true,
            _ => collection == Collection::Models,
        }
    }

    /// Store operators expressing the update; always exactly one.
    pub fn to_ops(&self) -> Vec<UpdateOp> {
        let op = match self {
            Self::Rename(name) => UpdateOp::set("name", name.as_str()),
            Self::AddTags(tags) => UpdateOp::add_to_set("tags", tags.iter().map(String::as_str)),
            Self::RemoveTags(tags) => UpdateOp::pull(
                "tags",
                ElementMatch::AnyOf(tags.iter().map(|tag| Value::from(tag.as_str())).collect()),
            ),
            Self::SetDescription(Some(description)) => {
                UpdateOp::set("description", description.as_str())
            }
            Self::SetDescription(None) => UpdateOp::unset("description"),
            Self::AddParam(param) => UpdateOp::push("params", param.to_value()),
            Self::RemoveParam(name) => UpdateOp::pull(
                "params",
                ElementMatch::Where(Filter::eq("parameter", name.as_str())),
            ),
            Self::AddMetric(metric) => UpdateOp::push("metrics", metric.to_value()),
            Self::RemoveMetric(name) => UpdateOp::pull(
                "metrics",
                ElementMatch::Where(Filter::eq("metric", name.as_str())),
            ),
            Self::SetConfig(config) => UpdateOp::set("config", config.clone()),
            Self::SetWeights(weights) => UpdateOp::set("weights", weights.clone()),
        };
        vec![op]
    }

    /// `(field, key)` for removals, which must modify the document.
    pub fn removal(&self) -> Option<(&'static str, String)> {
        match self {
            Self::RemoveTags(tags) => Some(("tags", tags.join(","))),
            Self::RemoveParam(name) => Some(("params", name.clone())),
            Self::RemoveMetric(name) => Some(("metrics", name.clone())),
            _ => None,
        }
    }
}
