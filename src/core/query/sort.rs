//! Multi-field, deterministic sorting

use crate::core::entity::Entity;
use crate::core::error::{StoreError, StoreResult};
use crate::core::field::FieldValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Synthetic sort key ordering records by search relevance score
pub const RELEVANCE_SORT_KEY: &str = "_relevance";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn is_relevance(&self) -> bool {
        self.field == RELEVANCE_SORT_KEY
    }
}

/// Ordered list of sort keys; earlier entries take precedence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(pub Vec<SortField>);

impl SortSpec {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn by(mut self, field: SortField) -> Self {
        self.0.push(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SortField> {
        self.0.iter()
    }

    pub fn uses_relevance(&self) -> bool {
        self.0.iter().any(SortField::is_relevance)
    }

    /// Parse the `field:asc,other:desc` form.
    ///
    /// A bare field name sorts ascending.
    pub fn parse(expr: &str) -> StoreResult<Self> {
        let mut spec = SortSpec::new();
        for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, direction) = match part.split_once(':') {
                Some((field, dir)) => {
                    let direction = match dir.trim().to_ascii_lowercase().as_str() {
                        "asc" => SortDirection::Asc,
                        "desc" => SortDirection::Desc,
                        other => {
                            return Err(StoreError::invalid_query(format!(
                                "unknown sort direction '{}' for field '{}'",
                                other, field
                            )));
                        }
                    };
                    (field.trim(), direction)
                }
                None => (part, SortDirection::Asc),
            };
            if field.is_empty() {
                return Err(StoreError::invalid_query("sort field name is empty"));
            }
            spec.0.push(SortField {
                field: field.to_string(),
                direction,
            });
        }
        Ok(spec)
    }
}

/// Sort records in place.
///
/// Sort keys are compared in order and the first non-equal one decides;
/// full ties fall back to the record identifier ascending. `relevance`
/// supplies scores for the `_relevance` key; records without a score sort
/// as the minimum.
pub fn sort_records<E: Entity>(
    records: &mut Vec<E>,
    spec: &SortSpec,
    relevance: &HashMap<String, f64>,
) {
    // Extract keys once instead of per comparison.
    let mut keyed: Vec<(Vec<Option<FieldValue>>, E)> = records
        .drain(..)
        .map(|record| {
            let keys = spec
                .iter()
                .map(|sort| {
                    if sort.is_relevance() {
                        relevance.get(record.id()).copied().map(FieldValue::Float)
                    } else {
                        record.field_value(&sort.field)
                    }
                })
                .collect();
            (keys, record)
        })
        .collect();

    keyed.sort_by(|(a_keys, a), (b_keys, b)| {
        spec.iter()
            .zip(a_keys.iter().zip(b_keys.iter()))
            .map(|(sort, (x, y))| {
                sort.direction
                    .apply(FieldValue::cmp_optional(x.as_ref(), y.as_ref()))
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.id().cmp(b.id()))
    });

    records.extend(keyed.into_iter().map(|(_, record)| record));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Record;

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample() -> Vec<Record> {
        vec![
            Record::new("d").with("amount", 10).with("level", "b"),
            Record::new("b").with("amount", -5).with("level", "a"),
            Record::new("a").with("amount", 5).with("level", "a"),
            Record::new("c").with("amount", 0).with("level", "b"),
        ]
    }

    #[test]
    fn test_single_field_ascending() {
        let mut records = sample();
        sort_records(&mut records, &SortSpec::new().by(SortField::asc("amount")), &HashMap::new());
        assert_eq!(ids(&records), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_direction_is_per_field() {
        let mut records = sample();
        let spec = SortSpec::new()
            .by(SortField::desc("level"))
            .by(SortField::asc("amount"));
        sort_records(&mut records, &spec, &HashMap::new());
        assert_eq!(ids(&records), vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn test_ties_fall_back_to_id() {
        let mut records = vec![
            Record::new("z").with("group", 1),
            Record::new("m").with("group", 1),
            Record::new("a").with("group", 1),
        ];
        sort_records(&mut records, &SortSpec::new().by(SortField::desc("group")), &HashMap::new());
        assert_eq!(ids(&records), vec!["a", "m", "z"]);
    }

    #[test]
    fn test_empty_spec_orders_by_id() {
        let mut records = sample();
        sort_records(&mut records, &SortSpec::new(), &HashMap::new());
        assert_eq!(ids(&records), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_missing_field_sorts_first_ascending() {
        let mut records = vec![
            Record::new("x").with("amount", 1),
            Record::new("y"),
            Record::new("w").with("amount", -100),
        ];
        sort_records(&mut records, &SortSpec::new().by(SortField::asc("amount")), &HashMap::new());
        assert_eq!(ids(&records), vec!["y", "w", "x"]);

        sort_records(&mut records, &SortSpec::new().by(SortField::desc("amount")), &HashMap::new());
        assert_eq!(ids(&records), vec!["x", "w", "y"]);
    }

    #[test]
    fn test_relevance_key() {
        let mut records = sample();
        let mut scores = HashMap::new();
        scores.insert("c".to_string(), 1.0);
        scores.insert("d".to_string(), 0.5);
        sort_records(
            &mut records,
            &SortSpec::new().by(SortField::desc(RELEVANCE_SORT_KEY)),
            &scores,
        );
        assert_eq!(ids(&records), vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn test_parse_expression() {
        let spec = SortSpec::parse("amount:desc, name").unwrap();
        assert_eq!(spec.0, vec![SortField::desc("amount"), SortField::asc("name")]);
        assert!(SortSpec::parse("").unwrap().is_empty());
        assert!(SortSpec::parse("amount:sideways").is_err());
        assert!(SortSpec::parse(":desc").is_err());
    }
}
