//! Domain validation for customer features
//!
//! Runs before any transform. Only the attributes with a closed domain are
//! checked here; tenure, address, income, employ and reside are trusted as
//! submitted.

use crate::errors::ValidationError;
use custcat_types::CustomerFeatures;
use std::ops::Deref;

/// Inclusive range rule for one integer attribute.
struct RangeRule {
    field: &'static str,
    min: i64,
    max: i64,
    constraint: &'static str,
    read: fn(&CustomerFeatures) -> i64,
}

/// Rules in canonical field order; the first violation wins.
const RULES: [RangeRule; 6] = [
    RangeRule {
        field: "region",
        min: 1,
        max: 3,
        constraint: "region must be between 1 and 3",
        read: |f| f.region,
    },
    RangeRule {
        field: "age",
        min: 18,
        max: 100,
        constraint: "age must be between 18 and 100",
        read: |f| f.age,
    },
    RangeRule {
        field: "marital",
        min: 0,
        max: 1,
        constraint: "marital must be 0 or 1",
        read: |f| f.marital,
    },
    RangeRule {
        field: "ed",
        min: 1,
        max: 5,
        constraint: "education level must be between 1 and 5",
        read: |f| f.ed,
    },
    RangeRule {
        field: "retire",
        min: 0,
        max: 1,
        constraint: "retire must be 0 or 1",
        read: |f| f.retire,
    },
    RangeRule {
        field: "gender",
        min: 0,
        max: 1,
        constraint: "gender must be 0 or 1",
        read: |f| f.gender,
    },
];

/// Customer features that passed [`validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedFeatures(CustomerFeatures);

impl ValidatedFeatures {
    pub fn into_inner(self) -> CustomerFeatures {
        self.0
    }
}

impl Deref for ValidatedFeatures {
    type Target = CustomerFeatures;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Check every closed-domain attribute of `features`.
pub fn validate(features: CustomerFeatures) -> Result<ValidatedFeatures, ValidationError> {
    for rule in &RULES {
        let value = (rule.read)(&features);
        if value < rule.min || value > rule.max {
            return Err(ValidationError {
                field: rule.field,
                value,
                constraint: rule.constraint,
            });
        }
    }
    Ok(ValidatedFeatures(features))
}
