//! Boundary parsing of loosely-typed list parameters
//!
//! Turns the string/JSON shape a caller receives (a query string, a YAML
//! document, a message payload) into a validated [`ListParams`].

use super::engine::ListParams;
use super::filter::{FilterSet, NumericOperator, StringOperator, TypedFilter};
use super::pagination::PaginationRequest;
use super::search::SearchSpec;
use super::sort::SortSpec;
use crate::core::error::{StoreError, StoreResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

static FILTER_KEY_REGEX: OnceLock<Regex> = OnceLock::new();

/// Loosely-typed list parameters
///
/// # Example
/// ```
/// use bizstore::core::query::ListQuery;
///
/// let query = ListQuery {
///     page: Some(2),
///     limit: Some(10),
///     filter: Some(r#"{"status": "active", "amount>=": 100}"#.to_string()),
///     sort: Some("amount:desc".to_string()),
///     ..Default::default()
/// };
/// let params = query.to_params(20).unwrap();
/// assert_eq!(params.filters.len(), 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Page number (starts at 1)
    pub page: Option<i32>,

    /// Items per page, 0 disables pagination
    pub limit: Option<i32>,

    /// Filters as a JSON object
    ///
    /// # Format
    /// - Equality: `{"field": value}` (kind follows the JSON type)
    /// - Comparison: `{"field>": n, "field<": n, "field>=": n, "field<=": n}`
    /// - Range: `{"field><": [low, high]}`
    /// - Inequality: `{"field!=": "text"}`
    /// - Text: `{"field~": "sub"}`, `{"field~*": "sub"}` (case-insensitive),
    ///   `{"field^": "prefix"}`, `{"field$": "suffix"}`
    pub filter: Option<String>,

    /// Typed filters in their serialized form, added to `filter`
    pub filters: Option<FilterSet>,

    /// Sort expression, `field:asc,other:desc`
    pub sort: Option<String>,

    /// Free-text query
    pub q: Option<String>,

    /// Comma-separated fields searched by `q`
    pub search_fields: Option<String>,
}

impl ListQuery {
    /// Build validated params, using `default_limit` when no limit is given.
    pub fn to_params(&self, default_limit: i32) -> StoreResult<ListParams> {
        let mut filters = match self.filter.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let value: Value = serde_json::from_str(raw).map_err(|e| {
                    StoreError::invalid_filter("filter", format!("not valid JSON: {}", e))
                })?;
                parse_filter_object(&value)?
            }
            _ => FilterSet::new(),
        };
        if let Some(explicit) = &self.filters {
            filters = filters.union(explicit);
        }

        let sort = match &self.sort {
            Some(expr) => SortSpec::parse(expr)?,
            None => SortSpec::new(),
        };

        let search = self.q.as_ref().map(|query| SearchSpec {
            query: query.clone(),
            fields: self
                .search_fields
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect(),
        });

        let params = ListParams {
            filters,
            sort,
            search,
            pagination: PaginationRequest::new(
                self.page.unwrap_or(1),
                self.limit.unwrap_or(default_limit),
            ),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Parse the JSON filter shorthand into typed filters.
///
/// Conditions are ANDed; keys are processed in document order.
pub fn parse_filter_object(value: &Value) -> StoreResult<FilterSet> {
    let object: &Map<String, Value> = value
        .as_object()
        .ok_or_else(|| StoreError::invalid_filter("filter", "expected a JSON object"))?;

    object
        .iter()
        .map(|(key, value)| parse_filter_entry(key, value))
        .collect()
}

fn parse_filter_entry(key: &str, value: &Value) -> StoreResult<TypedFilter> {
    let regex = FILTER_KEY_REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_.]+)(>=|<=|!=|><|~\*|>|<|~|\^|\$)?$")
            .expect("valid filter key regex")
    });
    let captures = regex
        .captures(key)
        .ok_or_else(|| StoreError::invalid_filter(key, "unrecognized filter key"))?;
    let field = &captures[1];
    let suffix = captures.get(2).map(|m| m.as_str()).unwrap_or("");

    let filter = match suffix {
        "" => match value {
            Value::Bool(b) => TypedFilter::boolean(field, *b),
            Value::Number(_) => {
                TypedFilter::numeric(field, NumericOperator::Equals(number(field, value)?))
            }
            Value::String(s) => TypedFilter::string(field, StringOperator::Equals, s.as_str()),
            other => {
                return Err(StoreError::invalid_filter(
                    field,
                    format!("cannot compare against {}", other),
                ));
            }
        },
        ">" => TypedFilter::numeric(field, NumericOperator::GreaterThan(number(field, value)?)),
        "<" => TypedFilter::numeric(field, NumericOperator::LessThan(number(field, value)?)),
        ">=" => TypedFilter::numeric(field, NumericOperator::GreaterOrEqual(number(field, value)?)),
        "<=" => TypedFilter::numeric(field, NumericOperator::LessOrEqual(number(field, value)?)),
        "><" => {
            let bounds = value.as_array().filter(|b| b.len() == 2).ok_or_else(|| {
                StoreError::invalid_filter(field, "range expects [low, high]")
            })?;
            TypedFilter::numeric(
                field,
                NumericOperator::Between {
                    low: number(field, &bounds[0])?,
                    high: number(field, &bounds[1])?,
                },
            )
        }
        "!=" => TypedFilter::string(field, StringOperator::NotEquals, text(field, value)?),
        "~" => TypedFilter::string(field, StringOperator::Contains, text(field, value)?),
        "~*" => TypedFilter::string_ci(field, StringOperator::Contains, text(field, value)?),
        "^" => TypedFilter::string(field, StringOperator::Prefix, text(field, value)?),
        "$" => TypedFilter::string(field, StringOperator::Suffix, text(field, value)?),
        other => {
            return Err(StoreError::invalid_filter(
                field,
                format!("unknown operator '{}'", other),
            ));
        }
    };

    filter.validate()?;
    Ok(filter)
}

fn number(field: &str, value: &Value) -> StoreResult<f64> {
    value.as_f64().ok_or_else(|| {
        StoreError::invalid_filter(field, format!("expected a number, got {}", value))
    })
}

fn text<'a>(field: &str, value: &'a Value) -> StoreResult<&'a str> {
    value.as_str().ok_or_else(|| {
        StoreError::invalid_filter(field, format!("expected a string, got {}", value))
    })
}
