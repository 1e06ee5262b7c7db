//! Records and the query shapes accepted by [`Db`](crate::db::Db).
//!
//! A [`Record`] is an application-level row keyed by logical field name.
//! A [`SerializedRecord`] is the flat row exchanged with drivers, keyed by
//! physical column name.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tabula_core::{DbError, DbResult};

use crate::query::builder::QueryBuilder;
use crate::value::Value;

/// A row as exchanged with a driver, keyed by physical column name.
pub type SerializedRecord = BTreeMap<String, Value>;

/// The logical field every record carries as its identifier.
pub const ID_FIELD: &str = "id";
/// The creation timestamp field.
pub const CREATED_FIELD: &str = "created";
/// The last-update timestamp field.
pub const UPDATED_FIELD: &str = "updated";

/// An application-level row keyed by logical field name.
///
/// # Examples
///
/// ```
/// use tabula_db::record::Record;
///
/// let record = Record::new().with("name", "Veronica").with("age", 31_i64);
/// assert_eq!(record.get("name").and_then(|v| v.as_str()), Some("Veronica"));
/// assert!(record.id().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field and returns the record, for chaining.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns `true` if the field is present (even when `Null`).
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// The record id, when set to a string.
    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Iterates over `(field, value)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from any serializable struct.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the value does not serialize to
    /// a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> DbResult<Self> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            other => Err(DbError::Serialization(format!(
                "Expected an object to build a record from, got {other}"
            ))),
        }
    }

    /// Deserializes this record into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the fields do not match `T`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> DbResult<T> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// A query accepted by the record operations.
///
/// `Fields` is a plain field-equality map whose entries are AND-ed together;
/// `Builder` is a full query AST.
#[derive(Debug, Clone)]
pub enum Query {
    /// Field-equality map, implicitly AND-ed.
    Fields(BTreeMap<String, Value>),
    /// A query AST.
    Builder(QueryBuilder),
}

impl Query {
    /// Shorthand for a single-field equality query.
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), value.into());
        Self::Fields(fields)
    }

    /// Converts the query into an AST rooted at `table`.
    ///
    /// # Errors
    ///
    /// Propagates construction errors from [`QueryBuilder::from_object`].
    pub fn into_builder(self, table: &str) -> DbResult<QueryBuilder> {
        match self {
            Self::Fields(fields) => QueryBuilder::from_object(table, &fields),
            Self::Builder(builder) => Ok(builder),
        }
    }
}

impl From<QueryBuilder> for Query {
    fn from(builder: QueryBuilder) -> Self {
        Self::Builder(builder)
    }
}

impl From<BTreeMap<String, Value>> for Query {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self::Fields(fields)
    }
}

impl From<Record> for Query {
    fn from(record: Record) -> Self {
        Self::Fields(record.fields)
    }
}
