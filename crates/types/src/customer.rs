use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Number of attributes in a customer feature vector.
pub const FEATURE_COUNT: usize = 11;

/// Attribute names in the order the fitted artifacts were trained on.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "region", "tenure", "age", "marital", "address", "income", "ed", "employ", "retire", "gender",
    "reside",
];

/// One customer's attributes as submitted for classification.
///
/// Field declaration order matches [`FEATURE_NAMES`], so the serialized form
/// keeps the canonical order as well.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatures {
    pub region: i64,
    pub tenure: i64,
    pub age: i64,
    pub marital: i64,
    pub address: i64,
    pub income: f64,
    pub ed: i64,
    pub employ: i64,
    pub retire: i64,
    pub gender: i64,
    pub reside: i64,
}

/// Errors raised while turning a JSON body into [`CustomerFeatures`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureIntakeError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("missing required fields: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("field '{field}' must be {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },
}

impl CustomerFeatures {
    /// Flatten into the canonical feature vector consumed by the scaler.
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.region as f64,
            self.tenure as f64,
            self.age as f64,
            self.marital as f64,
            self.address as f64,
            self.income,
            self.ed as f64,
            self.employ as f64,
            self.retire as f64,
            self.gender as f64,
            self.reside as f64,
        ]
    }

    /// Parse a request body.
    ///
    /// Presence of every field is checked first so that all absent names are
    /// reported together; a JSON `null` counts as absent. Unknown keys are
    /// ignored. Integer fields accept integral floats such as `3.0`.
    pub fn from_json(value: &Value) -> Result<Self, FeatureIntakeError> {
        let object = value.as_object().ok_or(FeatureIntakeError::NotAnObject)?;

        let missing = missing_fields(object);
        if !missing.is_empty() {
            return Err(FeatureIntakeError::Missing(missing));
        }

        Ok(Self {
            region: int_field(object, "region")?,
            tenure: int_field(object, "tenure")?,
            age: int_field(object, "age")?,
            marital: int_field(object, "marital")?,
            address: int_field(object, "address")?,
            income: real_field(object, "income")?,
            ed: int_field(object, "ed")?,
            employ: int_field(object, "employ")?,
            retire: int_field(object, "retire")?,
            gender: int_field(object, "gender")?,
            reside: int_field(object, "reside")?,
        })
    }
}

/// Names of required fields absent (or `null`) in `object`, in canonical order.
pub fn missing_fields(object: &Map<String, Value>) -> Vec<&'static str> {
    FEATURE_NAMES
        .iter()
        .copied()
        .filter(|name| object.get(*name).map_or(true, Value::is_null))
        .collect()
}

fn int_field(object: &Map<String, Value>, field: &'static str) -> Result<i64, FeatureIntakeError> {
    let invalid = FeatureIntakeError::InvalidType {
        field,
        expected: "an integer",
    };
    let number = match object.get(field) {
        Some(Value::Number(number)) => number,
        _ => return Err(invalid),
    };

    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => Ok(value as i64),
        _ => Err(invalid),
    }
}

fn real_field(object: &Map<String, Value>, field: &'static str) -> Result<f64, FeatureIntakeError> {
    object
        .get(field)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .ok_or(FeatureIntakeError::InvalidType {
            field,
            expected: "a number",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_body() -> Value {
        json!({
            "region": 1, "tenure": 12, "age": 30, "marital": 1, "address": 5,
            "income": 45.0, "ed": 3, "employ": 4, "retire": 0, "gender": 1, "reside": 2
        })
    }

    #[test]
    fn parses_complete_body() {
        let features = CustomerFeatures::from_json(&sample_body()).unwrap();
        assert_eq!(features.region, 1);
        assert_eq!(features.income, 45.0);
        assert_eq!(features.reside, 2);
    }

    #[test]
    fn vector_follows_canonical_order() {
        let features = CustomerFeatures::from_json(&sample_body()).unwrap();
        assert_eq!(
            features.to_vector(),
            [1.0, 12.0, 30.0, 1.0, 5.0, 45.0, 3.0, 4.0, 0.0, 1.0, 2.0]
        );
    }

    #[test]
    fn serialized_keys_match_feature_names() {
        let features = CustomerFeatures::from_json(&sample_body()).unwrap();
        let value = serde_json::to_value(features).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), FEATURE_COUNT);
        for name in FEATURE_NAMES {
            assert!(object.contains_key(name), "missing key {name}");
        }
    }

    #[test]
    fn reports_every_missing_field() {
        let mut body = sample_body();
        let object = body.as_object_mut().unwrap();
        object.remove("reside");
        object.remove("age");

        let err = CustomerFeatures::from_json(&body).unwrap_err();
        assert_eq!(err, FeatureIntakeError::Missing(vec!["age", "reside"]));
        assert!(err.to_string().contains("reside"));
    }

    #[test]
    fn null_counts_as_missing() {
        let mut body = sample_body();
        body["tenure"] = Value::Null;
        assert_eq!(
            CustomerFeatures::from_json(&body).unwrap_err(),
            FeatureIntakeError::Missing(vec!["tenure"])
        );
    }

    #[test]
    fn missing_is_reported_before_type_errors() {
        let mut body = sample_body();
        body["age"] = json!("thirty");
        body.as_object_mut().unwrap().remove("gender");
        assert_eq!(
            CustomerFeatures::from_json(&body).unwrap_err(),
            FeatureIntakeError::Missing(vec!["gender"])
        );
    }

    #[test]
    fn rejects_wrong_types() {
        let mut body = sample_body();
        body["age"] = json!("thirty");
        assert_eq!(
            CustomerFeatures::from_json(&body).unwrap_err(),
            FeatureIntakeError::InvalidType {
                field: "age",
                expected: "an integer"
            }
        );

        let mut body = sample_body();
        body["ed"] = json!(2.5);
        assert!(matches!(
            CustomerFeatures::from_json(&body),
            Err(FeatureIntakeError::InvalidType { field: "ed", .. })
        ));
    }

    #[test]
    fn accepts_integral_floats_and_integer_income() {
        let mut body = sample_body();
        body["region"] = json!(2.0);
        body["income"] = json!(45);
        let features = CustomerFeatures::from_json(&body).unwrap();
        assert_eq!(features.region, 2);
        assert_eq!(features.income, 45.0);
    }

    #[test]
    fn ignores_unknown_keys() {
        let mut body = sample_body();
        body["custcat"] = json!(4);
        assert!(CustomerFeatures::from_json(&body).is_ok());
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert_eq!(
            CustomerFeatures::from_json(&json!([1, 2, 3])).unwrap_err(),
            FeatureIntakeError::NotAnObject
        );
    }
}
