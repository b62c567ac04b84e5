//! Property validators
//!
//! A validator is attached to a property declaration and evaluated only on
//! explicit validation, never at construction.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationFailure;
use crate::schema::Properties;

/// Broad JSON value classification used by kind-tag validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `true` / `false`
    Bool,
    /// Any JSON number
    Number,
    /// A JSON string
    String,
    /// A JSON array
    Array,
    /// A JSON object
    Object,
}

impl ValueKind {
    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Null, Value::Null)
                | (Self::Bool, Value::Bool(_))
                | (Self::Number, Value::Number(_))
                | (Self::String, Value::String(_))
                | (Self::Array, Value::Array(_))
                | (Self::Object, Value::Object(_))
        )
    }

    fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// A declarative check attached to one property.
#[derive(Clone)]
pub enum Validator {
    /// Passes iff the callable returns true for the property value.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    /// Passes iff the value, rendered as a string, matches the pattern.
    Pattern(Regex),
    /// Passes iff the value is a member of the finite set.
    OneOf(Vec<Value>),
    /// Passes iff the numeric value lies in the inclusive interval.
    Range {
        /// Inclusive lower bound, unbounded when `None`.
        min: Option<f64>,
        /// Inclusive upper bound, unbounded when `None`.
        max: Option<f64>,
    },
    /// Passes iff the value is of the tagged kind.
    Kind(ValueKind),
    /// Passes iff the callable returns true for the whole property map.
    ///
    /// The cross-property rendition of a validation method on the instance.
    Instance(Arc<dyn Fn(&Properties) -> bool + Send + Sync>),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Pattern(re) => write!(f, "Pattern({re})"),
            Self::OneOf(values) => write!(f, "OneOf({values:?})"),
            Self::Range { min, max } => write!(f, "Range({min:?}..{max:?})"),
            Self::Kind(kind) => write!(f, "Kind({})", kind.name()),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl Validator {
    /// Convenience constructor for predicate validators.
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Convenience constructor for instance-level validators.
    pub fn instance(f: impl Fn(&Properties) -> bool + Send + Sync + 'static) -> Self {
        Self::Instance(Arc::new(f))
    }

    /// Evaluates the check, returning the failure when it does not pass.
    pub(crate) fn check(
        &self,
        property: &str,
        value: &Value,
        properties: &Properties,
    ) -> Option<ValidationFailure> {
        let failure = |message: String| {
            Some(ValidationFailure {
                property: property.to_string(),
                message,
            })
        };

        match self {
            Self::Predicate(f) => {
                if f(value) {
                    None
                } else {
                    failure("predicate rejected value".to_string())
                }
            }
            Self::Pattern(re) => {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if re.is_match(&rendered) {
                    None
                } else {
                    failure(format!("value does not match pattern {re}"))
                }
            }
            Self::OneOf(allowed) => {
                if allowed.contains(value) {
                    None
                } else {
                    failure(format!("value {value} not in enumeration"))
                }
            }
            Self::Range { min, max } => match value.as_f64() {
                Some(n) => {
                    let below = min.is_some_and(|m| n < m);
                    let above = max.is_some_and(|m| n > m);
                    if below || above {
                        failure(format!("value {n} outside range"))
                    } else {
                        None
                    }
                }
                None => failure("value is not numeric".to_string()),
            },
            Self::Kind(kind) => {
                if kind.matches(value) {
                    None
                } else {
                    failure(format!("expected a {} value", kind.name()))
                }
            }
            Self::Instance(f) => {
                if f(properties) {
                    None
                } else {
                    failure("instance check rejected value".to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(v: &Validator, value: Value) -> Option<ValidationFailure> {
        v.check("field", &value, &Properties::new())
    }

    #[test]
    fn predicate_passes_on_truthy_return() {
        let v = Validator::predicate(|value| value.as_i64().is_some_and(|n| n > 0));
        assert!(check(&v, json!(5)).is_none());
        assert!(check(&v, json!(-5)).is_some());
        assert!(check(&v, json!("five")).is_some());
    }

    #[test]
    fn pattern_matches_stringified_value() {
        let v = Validator::Pattern(Regex::new(r"^payment-").unwrap());
        assert!(check(&v, json!("payment-gw")).is_none());
        assert!(check(&v, json!("user-svc")).is_some());
        // Non-strings are rendered before matching.
        let numeric = Validator::Pattern(Regex::new(r"^\d+$").unwrap());
        assert!(check(&numeric, json!(42)).is_none());
    }

    #[test]
    fn one_of_requires_membership() {
        let v = Validator::OneOf(vec![json!("warn"), json!("err")]);
        assert!(check(&v, json!("warn")).is_none());
        assert!(check(&v, json!("info")).is_some());
    }

    #[test]
    fn range_is_inclusive_and_numeric_only() {
        let v = Validator::Range {
            min: Some(0.0),
            max: Some(100.0),
        };
        assert!(check(&v, json!(0)).is_none());
        assert!(check(&v, json!(100)).is_none());
        assert!(check(&v, json!(100.5)).is_some());
        assert!(check(&v, json!("fifty")).is_some());
    }

    #[test]
    fn half_open_ranges() {
        let v = Validator::Range {
            min: Some(1.0),
            max: None,
        };
        assert!(check(&v, json!(1_000_000)).is_none());
        assert!(check(&v, json!(0)).is_some());
    }

    #[test]
    fn kind_tag_checks_json_type() {
        let v = Validator::Kind(ValueKind::String);
        assert!(check(&v, json!("text")).is_none());
        assert!(check(&v, json!(1)).is_some());
    }

    #[test]
    fn instance_validator_sees_the_whole_map() {
        let v = Validator::instance(|props| {
            let min = props.get("min").and_then(Value::as_i64);
            let max = props.get("max").and_then(Value::as_i64);
            min.zip(max).is_some_and(|(lo, hi)| lo <= hi)
        });
        let mut props = Properties::new();
        props.insert("min", json!(1));
        props.insert("max", json!(9));
        assert!(v.check("min", &json!(1), &props).is_none());
    }
}
