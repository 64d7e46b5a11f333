//! Typed filter predicates and AND-composed filter sets

use crate::core::entity::Entity;
use crate::core::error::{StoreError, StoreResult};
use crate::core::field::FieldValue;
use serde::{Deserialize, Serialize};

/// Operators valid for string filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOperator {
    Equals,
    NotEquals,
    Contains,
    Prefix,
    Suffix,
}

/// Operators valid for numeric filters, operands included
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum NumericOperator {
    Equals(f64),
    GreaterThan(f64),
    LessThan(f64),
    GreaterOrEqual(f64),
    LessOrEqual(f64),
    /// Inclusive on both ends
    Between { low: f64, high: f64 },
}

/// Operators valid for boolean filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOperator {
    Equals,
}

/// The kind of a filter, matching the kind of field it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    String,
    Numeric,
    Boolean,
}

/// The predicate half of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterCondition {
    String {
        operator: StringOperator,
        value: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    Numeric {
        operator: NumericOperator,
    },
    Boolean {
        operator: BooleanOperator,
        value: bool,
    },
}

/// A typed predicate over one record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedFilter {
    pub field: String,
    #[serde(flatten)]
    pub condition: FilterCondition,
}

impl TypedFilter {
    pub fn string(
        field: impl Into<String>,
        operator: StringOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            condition: FilterCondition::String {
                operator,
                value: value.into(),
                case_insensitive: false,
            },
        }
    }

    /// Case-insensitive variant of [`TypedFilter::string`]
    pub fn string_ci(
        field: impl Into<String>,
        operator: StringOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            condition: FilterCondition::String {
                operator,
                value: value.into(),
                case_insensitive: true,
            },
        }
    }

    pub fn numeric(field: impl Into<String>, operator: NumericOperator) -> Self {
        Self {
            field: field.into(),
            condition: FilterCondition::Numeric { operator },
        }
    }

    pub fn boolean(field: impl Into<String>, value: bool) -> Self {
        Self {
            field: field.into(),
            condition: FilterCondition::Boolean {
                operator: BooleanOperator::Equals,
                value,
            },
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self.condition {
            FilterCondition::String { .. } => FilterKind::String,
            FilterCondition::Numeric { .. } => FilterKind::Numeric,
            FilterCondition::Boolean { .. } => FilterKind::Boolean,
        }
    }

    /// Check operands the type system cannot rule out.
    pub fn validate(&self) -> StoreResult<()> {
        if self.field.trim().is_empty() {
            return Err(StoreError::invalid_filter(&self.field, "field name is empty"));
        }

        if let FilterCondition::Numeric { operator } = &self.condition {
            let operands = match *operator {
                NumericOperator::Equals(v)
                | NumericOperator::GreaterThan(v)
                | NumericOperator::LessThan(v)
                | NumericOperator::GreaterOrEqual(v)
                | NumericOperator::LessOrEqual(v) => vec![v],
                NumericOperator::Between { low, high } => {
                    if low > high {
                        return Err(StoreError::invalid_filter(
                            &self.field,
                            format!("between bounds are reversed ({} > {})", low, high),
                        ));
                    }
                    vec![low, high]
                }
            };
            if operands.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::invalid_filter(
                    &self.field,
                    "numeric operand must be finite",
                ));
            }
        }

        Ok(())
    }

    /// Evaluate the filter against one record
    pub fn matches<E: Entity>(&self, record: &E) -> bool {
        match record.field_value(&self.field) {
            Some(value) => self.matches_value(&value),
            None => false,
        }
    }

    /// Evaluate the predicate against a field value.
    ///
    /// A value of the wrong kind never matches.
    pub fn matches_value(&self, value: &FieldValue) -> bool {
        match &self.condition {
            FilterCondition::String {
                operator,
                value: expected,
                case_insensitive,
            } => {
                let Some(actual) = value.as_text() else {
                    return false;
                };
                if *case_insensitive {
                    match_string(*operator, &actual.to_lowercase(), &expected.to_lowercase())
                } else {
                    match_string(*operator, &actual, expected)
                }
            }
            FilterCondition::Numeric { operator } => {
                let Some(actual) = value.as_f64() else {
                    return false;
                };
                match *operator {
                    NumericOperator::Equals(v) => actual == v,
                    NumericOperator::GreaterThan(v) => actual > v,
                    NumericOperator::LessThan(v) => actual < v,
                    NumericOperator::GreaterOrEqual(v) => actual >= v,
                    NumericOperator::LessOrEqual(v) => actual <= v,
                    NumericOperator::Between { low, high } => actual >= low && actual <= high,
                }
            }
            FilterCondition::Boolean {
                operator: BooleanOperator::Equals,
                value: expected,
            } => value.as_bool() == Some(*expected),
        }
    }
}

fn match_string(operator: StringOperator, actual: &str, expected: &str) -> bool {
    match operator {
        StringOperator::Equals => actual == expected,
        StringOperator::NotEquals => actual != expected,
        StringOperator::Contains => actual.contains(expected),
        StringOperator::Prefix => actual.starts_with(expected),
        StringOperator::Suffix => actual.ends_with(expected),
    }
}

/// Ordered list of filters that must all match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(pub Vec<TypedFilter>);

impl FilterSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, filter: TypedFilter) -> Self {
        self.0.push(filter);
        self
    }

    pub fn push(&mut self, filter: TypedFilter) {
        self.0.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypedFilter> {
        self.0.iter()
    }

    /// Concatenate two sets; the result matches iff both do.
    pub fn union(&self, other: &FilterSet) -> FilterSet {
        FilterSet(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    /// True iff every filter matches. An empty set matches every record.
    pub fn matches<E: Entity>(&self, record: &E) -> bool {
        self.0.iter().all(|filter| filter.matches(record))
    }

    pub fn validate(&self) -> StoreResult<()> {
        self.0.iter().try_for_each(TypedFilter::validate)
    }

    /// Keep only the records matching the set, preserving order
    pub fn apply<E: Entity>(&self, records: Vec<E>) -> Vec<E> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

impl FromIterator<TypedFilter> for FilterSet {
    fn from_iter<I: IntoIterator<Item = TypedFilter>>(iter: I) -> Self {
        FilterSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Record;
    use serde_json::json;

    fn course() -> Record {
        Record::new("c1")
            .with("name", "Advanced Mathematics")
            .with("seats", 0)
            .with("price", 12.5)
            .with("active", false)
            .with("code", "")
    }

    #[test]
    fn test_string_operators() {
        let r = course();
        assert!(
            TypedFilter::string("name", StringOperator::Equals, "Advanced Mathematics").matches(&r)
        );
        assert!(TypedFilter::string("name", StringOperator::NotEquals, "Physics").matches(&r));
        assert!(TypedFilter::string("name", StringOperator::Contains, "Math").matches(&r));
        assert!(TypedFilter::string("name", StringOperator::Prefix, "Adv").matches(&r));
        assert!(TypedFilter::string("name", StringOperator::Suffix, "ics").matches(&r));
        assert!(!TypedFilter::string("name", StringOperator::Contains, "math").matches(&r));
    }

    #[test]
    fn test_case_insensitive_string() {
        let r = course();
        assert!(TypedFilter::string_ci("name", StringOperator::Contains, "MATH").matches(&r));
        assert!(
            TypedFilter::string_ci("name", StringOperator::Equals, "advanced mathematics")
                .matches(&r)
        );
    }

    #[test]
    fn test_numeric_operators() {
        let r = course();
        assert!(TypedFilter::numeric("price", NumericOperator::GreaterThan(12.0)).matches(&r));
        assert!(TypedFilter::numeric("price", NumericOperator::LessOrEqual(12.5)).matches(&r));
        assert!(!TypedFilter::numeric("price", NumericOperator::LessThan(12.5)).matches(&r));
        assert!(
            TypedFilter::numeric("price", NumericOperator::Between { low: 12.5, high: 13.0 })
                .matches(&r)
        );
    }

    #[test]
    fn test_zero_values_are_real_filters() {
        let r = course();
        assert!(TypedFilter::numeric("seats", NumericOperator::Equals(0.0)).matches(&r));
        assert!(!TypedFilter::numeric("seats", NumericOperator::Equals(1.0)).matches(&r));
        assert!(TypedFilter::string("code", StringOperator::Equals, "").matches(&r));
        assert!(!TypedFilter::string("name", StringOperator::Equals, "").matches(&r));
        assert!(TypedFilter::boolean("active", false).matches(&r));
        assert!(!TypedFilter::boolean("active", true).matches(&r));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let r = course();
        assert!(!TypedFilter::string("tutor", StringOperator::NotEquals, "x").matches(&r));
        assert!(
            !TypedFilter::numeric("capacity", NumericOperator::GreaterOrEqual(0.0)).matches(&r)
        );
        assert!(!TypedFilter::boolean("archived", false).matches(&r));
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        let r = course();
        assert!(!TypedFilter::numeric("name", NumericOperator::GreaterThan(0.0)).matches(&r));
        assert!(!TypedFilter::string("seats", StringOperator::Equals, "0").matches(&r));
    }

    #[test]
    fn test_timestamp_matches_through_its_text() {
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let stamped = Record::new("a").with("slot", at);
        let stored = Record::from_json(stamped.to_json()).unwrap();

        let filter = TypedFilter::string("slot", StringOperator::Prefix, "2024-05");
        assert!(filter.matches(&stamped));
        assert!(filter.matches(&stored));
    }

    #[test]
    fn test_empty_set_matches_everything() {
        assert!(FilterSet::new().matches(&course()));
    }

    #[test]
    fn test_set_is_conjunction() {
        let r = course();
        let set = FilterSet::new()
            .with(TypedFilter::string("name", StringOperator::Contains, "Math"))
            .with(TypedFilter::numeric("seats", NumericOperator::GreaterThan(0.0)));
        assert!(!set.matches(&r));
    }

    #[test]
    fn test_validate_rejects_reversed_between() {
        let filter =
            TypedFilter::numeric("price", NumericOperator::Between { low: 5.0, high: 1.0 });
        let err = filter.validate().unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter { .. }));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let filter = TypedFilter::numeric("price", NumericOperator::Equals(f64::NAN));
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let filter = TypedFilter::numeric("amount", NumericOperator::GreaterOrEqual(0.0));
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            value,
            json!({
                "field": "amount",
                "kind": "numeric",
                "operator": {"op": "greater_or_equal", "value": 0.0},
            })
        );
        let back: TypedFilter = serde_json::from_value(value).unwrap();
        assert_eq!(back, filter);
    }
}
