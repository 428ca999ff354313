//! Structural and size validation of inbound metric payloads
//!
//! A request body is resolved once into a [`MetricPayload`] (a single object
//! or a list) and then validated element by element. The first failing
//! element aborts validation; nothing from a rejected batch is accepted.

use serde_json::{Map, Value};

use crate::{Dimensions, MAX_DIMENSION_LENGTH, MAX_NAME_LENGTH, Metric};

/// The two shapes a metrics POST body may take
#[derive(Debug, Clone, PartialEq)]
pub enum MetricPayload {
    Single(Value),
    Batch(Vec<Value>),
}

impl From<Value> for MetricPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => MetricPayload::Batch(items),
            other => MetricPayload::Single(other),
        }
    }
}

impl MetricPayload {
    /// Number of metrics carried by the payload
    pub fn len(&self) -> usize {
        match self {
            MetricPayload::Single(_) => 1,
            MetricPayload::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The metric field that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    /// The element is not a JSON object
    Metric,
    Name,
    Timestamp,
    Value,
    Dimensions,
}

impl MetricField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Metric => "metric",
            MetricField::Name => "name",
            MetricField::Timestamp => "timestamp",
            MetricField::Value => "value",
            MetricField::Dimensions => "dimensions",
        }
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric in a payload violated a structural or size constraint
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("metric {index}: invalid {field}: {reason}")]
pub struct ValidationError {
    /// Position of the offending metric in the batch (0 for single metrics)
    pub index: usize,
    pub field: MetricField,
    pub reason: String,
}

impl ValidationError {
    fn new(index: usize, field: MetricField, reason: impl Into<String>) -> Self {
        Self {
            index,
            field,
            reason: reason.into(),
        }
    }
}

/// Validate every metric in the payload and return the typed metrics
pub fn validate(payload: &MetricPayload) -> Result<Vec<Metric>, ValidationError> {
    match payload {
        MetricPayload::Single(value) => Ok(vec![validate_metric(0, value)?]),
        MetricPayload::Batch(values) => values
            .iter()
            .enumerate()
            .map(|(index, value)| validate_metric(index, value))
            .collect(),
    }
}

fn validate_metric(index: usize, value: &Value) -> Result<Metric, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new(index, MetricField::Metric, "expected a JSON object"))?;

    let name = match object.get("name") {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(ValidationError::new(index, MetricField::Name, "must be a string"));
        }
        None => return Err(ValidationError::new(index, MetricField::Name, "is required")),
    };
    if name.is_empty() {
        return Err(ValidationError::new(index, MetricField::Name, "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            index,
            MetricField::Name,
            format!("exceeds {MAX_NAME_LENGTH} characters"),
        ));
    }

    let timestamp = number_field(index, object, "timestamp", MetricField::Timestamp)?;
    let metric_value = number_field(index, object, "value", MetricField::Value)?;

    let dimensions = match object.get("dimensions") {
        None | Some(Value::Null) => Dimensions::new(),
        Some(Value::Object(raw)) => validate_dimensions(index, raw)?,
        Some(_) => {
            return Err(ValidationError::new(
                index,
                MetricField::Dimensions,
                "must be an object",
            ));
        }
    };

    Ok(Metric {
        name: name.clone(),
        timestamp,
        value: metric_value,
        dimensions,
    })
}

fn number_field(
    index: usize,
    object: &Map<String, Value>,
    key: &str,
    field: MetricField,
) -> Result<serde_json::Number, ValidationError> {
    match object.get(key) {
        Some(Value::Number(number)) => Ok(number.clone()),
        Some(_) => Err(ValidationError::new(index, field, "must be a number")),
        None => Err(ValidationError::new(index, field, "is required")),
    }
}

fn validate_dimensions(
    index: usize,
    raw: &Map<String, Value>,
) -> Result<Dimensions, ValidationError> {
    let mut dimensions = Dimensions::new();

    for (key, value) in raw {
        if key.is_empty() {
            return Err(ValidationError::new(
                index,
                MetricField::Dimensions,
                "keys must not be empty",
            ));
        }
        if key.chars().count() > MAX_DIMENSION_LENGTH {
            return Err(ValidationError::new(
                index,
                MetricField::Dimensions,
                format!("key exceeds {MAX_DIMENSION_LENGTH} characters"),
            ));
        }

        let Value::String(value) = value else {
            return Err(ValidationError::new(
                index,
                MetricField::Dimensions,
                format!("value of '{key}' must be a string"),
            ));
        };
        if value.chars().count() > MAX_DIMENSION_LENGTH {
            return Err(ValidationError::new(
                index,
                MetricField::Dimensions,
                format!("value of '{key}' exceeds {MAX_DIMENSION_LENGTH} characters"),
            ));
        }

        dimensions.insert(key.clone(), value.clone());
    }

    Ok(dimensions)
}
