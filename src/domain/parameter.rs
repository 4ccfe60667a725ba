use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recorded JSON shape of an orchestration's input type.
///
/// The shape is the serialized skeleton of an example value: field names and
/// JSON kinds, captured when the description is registered. Validation is a
/// single structural capability — a candidate value matches when every
/// recorded field is present with the same kind and no unknown fields appear.
/// A `null` inside the shape places no constraint on that position (this is
/// what an `Option::None` field in the example collapses to).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterDefinition {
    shape: Option<Value>,
}

impl ParameterDefinition {
    /// A definition for orchestrations that take no input.
    pub fn none() -> Self {
        Self { shape: None }
    }

    /// Record the shape of `example`'s serialized form.
    pub fn from_example<T: Serialize>(example: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            shape: Some(serde_json::to_value(example)?),
        })
    }

    /// Use an explicit JSON skeleton as the shape.
    pub fn from_shape(shape: Value) -> Self {
        Self { shape: Some(shape) }
    }

    /// Structural check of a (possibly absent) candidate value against the
    /// recorded shape. Absent input is only valid for a `none` definition.
    pub fn validate(&self, value: Option<&Value>) -> bool {
        match (&self.shape, value) {
            (None, None) | (None, Some(Value::Null)) => true,
            (None, Some(_)) => false,
            (Some(_), None) => false,
            (Some(shape), Some(value)) => shape_matches(shape, value),
        }
    }
}

fn shape_matches(shape: &Value, value: &Value) -> bool {
    match (shape, value) {
        // Null in the shape carries no type information.
        (Value::Null, _) => true,
        (Value::Object(shape), Value::Object(value)) => {
            shape
                .iter()
                .all(|(k, s)| value.get(k).is_some_and(|v| shape_matches(s, v)))
                && value.keys().all(|k| shape.contains_key(k))
        }
        (Value::Array(shape), Value::Array(value)) => match shape.first() {
            Some(element) => value.iter().all(|v| shape_matches(element, v)),
            None => true,
        },
        (Value::String(_), Value::String(_)) => true,
        (Value::Number(_), Value::Number(_)) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("value does not match the recorded parameter shape")]
    ShapeMismatch,
    #[error("parameter serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An instance's input: the serialized form plus the parsed value, validated
/// against the owning description's [`ParameterDefinition`] at assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    serialized: String,
    value: Value,
}

impl ParameterValue {
    /// Validate `input` against `definition` and capture it.
    pub fn new(
        definition: &ParameterDefinition,
        input: Option<Value>,
    ) -> Result<Self, ParameterError> {
        if !definition.validate(input.as_ref()) {
            return Err(ParameterError::ShapeMismatch);
        }
        let value = input.unwrap_or(Value::Null);
        Ok(Self {
            serialized: value.to_string(),
            value,
        })
    }

    /// Serialize a typed input, then validate and capture it.
    pub fn from_typed<T: Serialize>(
        definition: &ParameterDefinition,
        input: &T,
    ) -> Result<Self, ParameterError> {
        let value = serde_json::to_value(input)?;
        Self::new(definition, Some(value))
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct CalculationInput {
        calculation_type: String,
        year: u32,
        resend: bool,
    }

    fn definition() -> ParameterDefinition {
        ParameterDefinition::from_example(&CalculationInput {
            calculation_type: "aggregation".into(),
            year: 2024,
            resend: false,
        })
        .unwrap()
    }

    #[test]
    fn matching_value_is_accepted() {
        let def = definition();
        let value = json!({"calculation_type": "balance", "year": 2025, "resend": true});
        assert!(def.validate(Some(&value)));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let def = definition();
        let value = json!({"calculation_type": "balance", "year": "2025", "resend": true});
        assert!(!def.validate(Some(&value)));
    }

    #[test]
    fn missing_and_unknown_fields_are_rejected() {
        let def = definition();
        assert!(!def.validate(Some(&json!({"calculation_type": "balance"}))));
        assert!(!def.validate(Some(&json!({
            "calculation_type": "balance", "year": 2025, "resend": true, "extra": 1
        }))));
    }

    #[test]
    fn none_definition_accepts_only_absent_input() {
        let def = ParameterDefinition::none();
        assert!(def.validate(None));
        assert!(def.validate(Some(&Value::Null)));
        assert!(!def.validate(Some(&json!({"year": 2024}))));
    }

    #[test]
    fn definition_rejects_absent_input_when_shape_recorded() {
        assert!(!definition().validate(None));
    }

    #[test]
    fn typed_round_trip() {
        let def = definition();
        let input = CalculationInput {
            calculation_type: "balance".into(),
            year: 2025,
            resend: true,
        };
        let value = ParameterValue::from_typed(&def, &input).unwrap();
        assert_eq!(value.deserialize::<CalculationInput>().unwrap(), input);
        assert!(value.serialized().contains("balance"));
    }

    #[test]
    fn null_shape_field_accepts_any_kind() {
        let def = ParameterDefinition::from_shape(json!({"period": null}));
        assert!(def.validate(Some(&json!({"period": "P1D"}))));
        assert!(def.validate(Some(&json!({"period": 86400}))));
    }
}
