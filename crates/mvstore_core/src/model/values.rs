//! Param and Metric value objects.
//!
//! Names are identity keys and never change; editing a value means
//! removing the old object and adding a new one.

use super::entity::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Training/configuration parameter (`{parameter, value}` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    parameter: String,
    value: Value,
}

impl Param {
    /// Builds a param; any JSON value is accepted.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyParamName);
        }
        Ok(Self {
            parameter: name,
            value: value.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.parameter
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({ "parameter": self.parameter, "value": self.value })
    }
}

/// Evaluation metric (`{metric, value}` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    metric: String,
    value: Value,
}

impl Metric {
    /// Builds a metric; the value must be a number or a string.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyMetricName);
        }
        let value = value.into();
        if !(value.is_number() || value.is_string()) {
            return Err(ValidationError::NonScalarMetric { metric: name });
        }
        Ok(Self {
            metric: name,
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.metric
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn to_value(&self) -> Value {
        json!({ "metric": self.metric, "value": self.value })
    }
}

/// Rejects a second object with an already-used name.
pub(crate) fn ensure_unique_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    duplicate: impl Fn(String) -> ValidationError,
) -> Result<(), ValidationError> {
    let mut seen: Vec<&str> = Vec::new();
    for name in names {
        if seen.contains(&name) {
            return Err(duplicate(name.to_string()));
        }
        seen.push(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Metric, Param};
    use crate::model::entity::ValidationError;
    use serde_json::json;

    #[test]
    fn metric_rejects_structured_values() {
        let err = Metric::new("confusion", json!([[1, 0], [0, 1]])).unwrap_err();
        assert!(matches!(err, ValidationError::NonScalarMetric { metric } if metric == "confusion"));
        assert!(Metric::new("accuracy", 0.7).is_ok());
        assert!(Metric::new("grade", "A").is_ok());
    }

    #[test]
    fn param_accepts_structured_values_but_not_blank_names() {
        let param = Param::new("layers", json!({"hidden": [64, 32]})).unwrap();
        assert_eq!(param.to_value()["parameter"], "layers");
        assert_eq!(Param::new(" ", 1).unwrap_err(), ValidationError::EmptyParamName);
    }
}
