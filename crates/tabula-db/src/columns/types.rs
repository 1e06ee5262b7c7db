//! Scalar column kinds.
//!
//! Each kind converts between the values an application hands in and the
//! values stored by a driver. Conversions are lenient on the way out of the
//! database (a SQLite `INTEGER` comes back as an `Int` even for a boolean
//! column) and strict on the way in.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tabula_core::{DbError, DbResult};

use super::{Column, ColumnBase, ColumnType, ConfigureColumn};
use crate::value::Value;

macro_rules! column_struct {
    ($(#[$meta:meta])* $name:ident $({ $($field:ident : $ty:ty = $default:expr),* $(,)? })?) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            base: ColumnBase,
            $($(pub $field: $ty,)*)?
        }

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    base: ColumnBase::new(name),
                    $($($field: $default,)*)?
                }
            }
        }

        impl ConfigureColumn for $name {
            fn base_mut(&mut self) -> &mut ColumnBase {
                &mut self.base
            }
        }
    };
}

fn mismatch(column: &str, expected: &str, value: &Value) -> DbError {
    DbError::validation(format!(
        "Column '{column}' expects {expected}, got {value:?}"
    ))
}

column_struct!(
    /// A 32-bit integer column.
    IntegerColumn
);
column_struct!(
    /// A 64-bit integer column.
    BigIntegerColumn
);
column_struct!(
    /// A length-limited string column.
    StringColumn { max_length: Option<usize> = None }
);
column_struct!(
    /// An unbounded text column.
    TextColumn
);
column_struct!(FloatColumn);
column_struct!(
    /// An exact decimal column; values are kept in their textual form.
    DecimalColumn { precision: u32 = 38, scale: u32 = 9 }
);
column_struct!(BooleanColumn);
column_struct!(DateColumn);
column_struct!(
    /// A timestamp column. Values are normalized to UTC.
    DateTimeColumn
);
column_struct!(BinaryColumn);
column_struct!(UuidColumn);
column_struct!(
    /// A JSON document column.
    ObjectColumn
);
column_struct!(
    /// A column holding a list of scalar values.
    ArrayColumn { element: ColumnType = ColumnType::Text }
);

fn integer_value(column: &str, value: Value, bits: u32) -> DbResult<Value> {
    let parsed = match value {
        Value::Null => return Ok(Value::Null),
        Value::Int(i) => i,
        Value::Bool(b) => i64::from(b),
        Value::String(ref s) | Value::Decimal(ref s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| mismatch(column, "an integer", &value))?,
        other => return Err(mismatch(column, "an integer", &other)),
    };
    if bits == 32 && i32::try_from(parsed).is_err() {
        return Err(DbError::validation(format!(
            "Column '{column}' value {parsed} is out of range for a 32-bit integer"
        )));
    }
    Ok(Value::Int(parsed))
}

impl StringColumn {
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

impl DecimalColumn {
    #[must_use]
    pub const fn precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}

impl ArrayColumn {
    #[must_use]
    pub fn of(mut self, element: ColumnType) -> Self {
        self.element = element;
        self
    }
}

impl Column for IntegerColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Integer
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        integer_value(self.name(), value, 32)
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        integer_value(self.name(), value, 64)
    }
}

impl Column for BigIntegerColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::BigInteger
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        integer_value(self.name(), value, 64)
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        integer_value(self.name(), value, 64)
    }
}

impl Column for StringColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::String {
            max_length: self.max_length,
        }
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        let text = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s,
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Uuid(_) => {
                value.to_string()
            }
            other => return Err(mismatch(self.name(), "a string", &other)),
        };
        if let Some(max_length) = self.max_length {
            let length = text.chars().count();
            if length > max_length {
                return Err(DbError::validation(format!(
                    "Column '{}' allows at most {max_length} characters, got {length}",
                    self.name()
                )));
            }
        }
        Ok(Value::String(text))
    }
}

impl Column for TextColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Text
    }
}

impl Column for FloatColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Float
    }

    #[allow(clippy::cast_precision_loss)]
    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Decimal(ref s) | Value::String(ref s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch(self.name(), "a number", &value)),
            other => Err(mismatch(self.name(), "a number", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        self.serialize(value)
    }
}

impl Column for DecimalColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Decimal {
            precision: self.precision,
            scale: self.scale,
        }
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Decimal(_) => Ok(value),
            Value::Int(i) => Ok(Value::Decimal(i.to_string())),
            Value::Float(f) => Ok(Value::Decimal(f.to_string())),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                Ok(Value::Decimal(s.trim().to_string()))
            }
            other => Err(mismatch(self.name(), "a decimal", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::String(s) => Ok(Value::Decimal(s)),
            other => self.serialize(other),
        }
    }
}

impl Column for BooleanColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Boolean
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Bool(_) => Ok(value),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            other => Err(mismatch(self.name(), "a boolean", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Int(i) => Ok(Value::Bool(i != 0)),
            Value::String(ref s) => match s.as_str() {
                "true" | "TRUE" | "1" => Ok(Value::Bool(true)),
                "false" | "FALSE" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch(self.name(), "a boolean", &value)),
            },
            other => self.serialize(other),
        }
    }
}

impl Column for DateColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Date
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Date(_) => Ok(value),
            Value::DateTime(dt) => Ok(Value::Date(dt.date())),
            Value::DateTimeTz(dt) => Ok(Value::Date(dt.date_naive())),
            Value::String(ref s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| mismatch(self.name(), "a YYYY-MM-DD date", &value)),
            other => Err(mismatch(self.name(), "a date", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        self.serialize(value)
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

impl Column for DateTimeColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::DateTime
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::DateTimeTz(_) => Ok(value),
            Value::DateTime(naive) => Ok(Value::DateTimeTz(naive.and_utc())),
            Value::String(ref s) => parse_timestamp(s)
                .map(Value::DateTimeTz)
                .ok_or_else(|| mismatch(self.name(), "a timestamp", &value)),
            other => Err(mismatch(self.name(), "a timestamp", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        self.serialize(value)
    }
}

impl Column for BinaryColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Binary
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Bytes(_) => Ok(value),
            Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch(self.name(), "bytes", &other)),
        }
    }
}

impl Column for UuidColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Uuid
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null => Ok(value),
            Value::Uuid(u) => Ok(Value::String(u.hyphenated().to_string())),
            Value::String(ref s) => uuid::Uuid::parse_str(s)
                .map(|u| Value::String(u.hyphenated().to_string()))
                .map_err(|_| mismatch(self.name(), "a UUID", &value)),
            other => Err(mismatch(self.name(), "a UUID", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::String(ref s) => uuid::Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| mismatch(self.name(), "a UUID", &value)),
            other => Ok(other),
        }
    }
}

impl Column for ObjectColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Object
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::Json(_) => Ok(value),
            Value::List(_) => Ok(Value::Json(value.to_json())),
            other => Err(mismatch(self.name(), "a JSON document", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::String(s) => Ok(Value::Json(serde_json::from_str(&s)?)),
            other => Ok(other),
        }
    }
}

impl Column for ArrayColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Array(Box::new(self.element.clone()))
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null | Value::List(_) => Ok(value),
            other => Err(mismatch(self.name(), "a list", &other)),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::String(s) => Ok(Value::from_json(serde_json::from_str(&s)?)),
            Value::Json(json @ serde_json::Value::Array(_)) => Ok(Value::from_json(json)),
            other => Ok(other),
        }
    }
}
