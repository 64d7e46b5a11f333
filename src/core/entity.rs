//! Entity and record abstractions consumed by the query engine

use crate::core::field::FieldValue;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the timestamp field stamped on create.
pub const CREATED_AT: &str = "created_at";

/// Name of the timestamp field refreshed on every write.
pub const UPDATED_AT: &str = "updated_at";

/// Base trait for anything the list-query engine can operate on.
///
/// The engine never assumes a fixed schema: it only needs a stable,
/// unique identifier and checked access to named fields.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Get the unique identifier for this entity instance
    fn id(&self) -> &str;

    /// Get the value of a specific field by name
    ///
    /// Returns `None` when the field is absent. Filters treat an absent
    /// field as a non-match and sorting treats it as the minimum value.
    fn field_value(&self, field: &str) -> Option<FieldValue>;
}

/// Identifier of the tenant owning a set of records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A schema-less entity instance: an identifier plus named fields.
///
/// Serializes as a flat JSON object `{"id": ..., <fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record with the given identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let field = field.into();
        if field == "id" {
            return;
        }
        self.fields.insert(field, value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Apply a partial update using merge-patch semantics.
    ///
    /// A `Null` value removes the field; the identifier is never changed.
    pub fn merge(&mut self, partial: IndexMap<String, FieldValue>) {
        for (field, value) in partial {
            if field == "id" {
                continue;
            }
            if value.is_null() {
                self.fields.shift_remove(&field);
            } else {
                self.fields.insert(field, value);
            }
        }
    }

    /// Stamp `created_at` if absent and refresh `updated_at`.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if !self.fields.contains_key(CREATED_AT) {
            self.fields
                .insert(CREATED_AT.to_string(), FieldValue::DateTime(now));
        }
        self.fields
            .insert(UPDATED_AT.to_string(), FieldValue::DateTime(now));
    }

    /// Build a record from a JSON object.
    ///
    /// The `id` member may be a string or a number; it defaults to empty
    /// when absent so providers can assign one.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        let serde_json::Value::Object(map) = value else {
            return None;
        };

        let mut record = Record::new(String::new());
        for (key, value) in map {
            if key == "id" {
                record.id = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
            } else {
                record.fields.insert(key, FieldValue::from_json(value));
            }
        }
        Some(record)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        map.insert("id".into(), serde_json::Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl Entity for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn field_value(&self, field: &str) -> Option<FieldValue> {
        if field == "id" {
            return Some(FieldValue::String(self.id.clone()));
        }
        self.fields.get(field).cloned()
    }
}
