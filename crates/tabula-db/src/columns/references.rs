//! Reference column kinds.
//!
//! A reference column stores the `id` of a row in another table. With
//! `cascade_delete` set, deleting the holder row first deletes the rows it
//! points to. [`ReferenceColumn::reverse_cascade_delete`] covers the other
//! direction: deleting the referenced row deletes the holders.

use std::collections::BTreeMap;

use tabula_core::{DbError, DbResult};

use super::{Column, ColumnBase, ColumnType, ConfigureColumn, DynamicReferenceRole};
use crate::db::Db;
use crate::query::builder::{Condition, QueryBuilder};
use crate::record::{Record, ID_FIELD};
use crate::value::Value;

fn id_value(column: &str, value: Value) -> DbResult<Value> {
    match value {
        Value::Null | Value::String(_) => Ok(value),
        Value::Uuid(u) => Ok(Value::String(u.simple().to_string())),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        other => Err(DbError::validation(format!(
            "Column '{column}' expects a row id, got {other:?}"
        ))),
    }
}

fn push_id(ids: &mut Vec<String>, value: Option<&Value>) {
    if let Some(id) = value.and_then(Value::as_str) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
}

/// Deletes every row of `table` whose id is in `ids`.
async fn delete_ids(db: &Db, table: &str, ids: Vec<String>) -> DbResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut query = QueryBuilder::new(table);
    query.condition(Condition::is_in(
        ID_FIELD,
        ids.into_iter().map(Value::String).collect(),
    ))?;
    db.delete(table, query).await
}

/// A reference to one row of `target_table`.
#[derive(Debug, Clone)]
pub struct ReferenceColumn {
    base: ColumnBase,
    pub target_table: String,
    pub cascade_delete: bool,
    pub reverse_cascade_delete: bool,
}

impl ReferenceColumn {
    pub fn new(name: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            base: ColumnBase::new(name),
            target_table: target_table.into(),
            cascade_delete: false,
            reverse_cascade_delete: false,
        }
    }

    /// Deleting the holder row deletes the referenced row.
    #[must_use]
    pub const fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    /// Deleting the referenced row deletes the holder row.
    #[must_use]
    pub const fn reverse_cascade_delete(mut self) -> Self {
        self.reverse_cascade_delete = true;
        self
    }
}

impl ConfigureColumn for ReferenceColumn {
    fn base_mut(&mut self) -> &mut ColumnBase {
        &mut self.base
    }
}

#[async_trait::async_trait]
impl Column for ReferenceColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::Reference
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        id_value(self.name(), value)
    }

    async fn before_delete(&self, field: &str, records: &[Record], db: &Db) -> DbResult<()> {
        if !self.cascade_delete {
            return Ok(());
        }
        let mut ids = Vec::new();
        for record in records {
            push_id(&mut ids, record.get(field));
        }
        delete_ids(db, &self.target_table, ids).await?;
        Ok(())
    }

    fn reference_target(&self) -> Option<&str> {
        Some(&self.target_table)
    }

    fn reverse_cascade_delete(&self) -> bool {
        self.reverse_cascade_delete
    }
}

/// A list of references to rows of `target_table`.
#[derive(Debug, Clone)]
pub struct ReferenceArrayColumn {
    base: ColumnBase,
    pub target_table: String,
    pub cascade_delete: bool,
}

impl ReferenceArrayColumn {
    pub fn new(name: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            base: ColumnBase::new(name),
            target_table: target_table.into(),
            cascade_delete: false,
        }
    }

    #[must_use]
    pub const fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }
}

impl ConfigureColumn for ReferenceArrayColumn {
    fn base_mut(&mut self) -> &mut ColumnBase {
        &mut self.base
    }
}

#[async_trait::async_trait]
impl Column for ReferenceArrayColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::ReferenceArray
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::Null => Ok(value),
            Value::List(items) => items
                .into_iter()
                .map(|item| id_value(self.name(), item))
                .collect::<DbResult<Vec<_>>>()
                .map(Value::List),
            other => Err(DbError::validation(format!(
                "Column '{}' expects a list of row ids, got {other:?}",
                self.name()
            ))),
        }
    }

    fn deserialize(&self, value: Value) -> DbResult<Value> {
        match value {
            Value::String(s) => Ok(Value::from_json(serde_json::from_str(&s)?)),
            other => Ok(other),
        }
    }

    async fn before_delete(&self, field: &str, records: &[Record], db: &Db) -> DbResult<()> {
        if !self.cascade_delete {
            return Ok(());
        }
        let mut ids = Vec::new();
        for record in records {
            if let Some(items) = record.get(field).and_then(Value::as_list) {
                for item in items {
                    push_id(&mut ids, Some(item));
                }
            }
        }
        delete_ids(db, &self.target_table, ids).await?;
        Ok(())
    }

    fn reference_target(&self) -> Option<&str> {
        Some(&self.target_table)
    }
}

/// Holds the table name half of a dynamic reference.
#[derive(Debug, Clone)]
pub struct DynamicReferenceTableNameColumn {
    base: ColumnBase,
    /// The logical field of the companion [`DynamicReferenceColumn`].
    pub reference_field: String,
}

impl DynamicReferenceTableNameColumn {
    pub fn new(name: impl Into<String>, reference_field: impl Into<String>) -> Self {
        Self {
            base: ColumnBase::new(name),
            reference_field: reference_field.into(),
        }
    }
}

impl ConfigureColumn for DynamicReferenceTableNameColumn {
    fn base_mut(&mut self) -> &mut ColumnBase {
        &mut self.base
    }
}

impl Column for DynamicReferenceTableNameColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::DynamicReferenceTableName
    }

    fn dynamic_reference(&self) -> Option<DynamicReferenceRole<'_>> {
        Some(DynamicReferenceRole::TableName {
            reference_field: &self.reference_field,
        })
    }
}

/// Holds the row id half of a dynamic reference; the target table is read
/// from the companion table name field of the same record.
#[derive(Debug, Clone)]
pub struct DynamicReferenceColumn {
    base: ColumnBase,
    pub table_name_field: String,
    pub cascade_delete: bool,
}

impl DynamicReferenceColumn {
    pub fn new(name: impl Into<String>, table_name_field: impl Into<String>) -> Self {
        Self {
            base: ColumnBase::new(name),
            table_name_field: table_name_field.into(),
            cascade_delete: false,
        }
    }

    #[must_use]
    pub const fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }
}

impl ConfigureColumn for DynamicReferenceColumn {
    fn base_mut(&mut self) -> &mut ColumnBase {
        &mut self.base
    }
}

#[async_trait::async_trait]
impl Column for DynamicReferenceColumn {
    fn base(&self) -> &ColumnBase {
        &self.base
    }

    fn column_type(&self) -> ColumnType {
        ColumnType::DynamicReference
    }

    fn serialize(&self, value: Value) -> DbResult<Value> {
        id_value(self.name(), value)
    }

    async fn before_delete(&self, field: &str, records: &[Record], db: &Db) -> DbResult<()> {
        if !self.cascade_delete {
            return Ok(());
        }
        let mut by_table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records {
            let Some(table) = record.get(&self.table_name_field).and_then(Value::as_str) else {
                continue;
            };
            push_id(by_table.entry(table.to_string()).or_default(), record.get(field));
        }
        for (table, ids) in by_table {
            delete_ids(db, &table, ids).await?;
        }
        Ok(())
    }

    fn dynamic_reference(&self) -> Option<DynamicReferenceRole<'_>> {
        Some(DynamicReferenceRole::Reference {
            table_name_field: &self.table_name_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_flags() {
        let column = ReferenceColumn::new("member_id", "member");
        assert!(!column.cascade_delete);
        assert!(!Column::reverse_cascade_delete(&column));

        let column = ReferenceColumn::new("member_id", "member")
            .cascade_delete()
            .not_null();
        assert!(column.cascade_delete);
        assert!(!column.options().nullable);
        assert_eq!(column.column_type(), ColumnType::Reference);
    }

    #[test]
    fn test_reference_accepts_uuid() {
        let column = ReferenceColumn::new("member_id", "member");
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            column.serialize(Value::Uuid(id)).unwrap(),
            Value::String(id.simple().to_string())
        );
        assert!(column.serialize(Value::Bool(true)).is_err());
    }

    #[test]
    fn test_reference_array_serialize() {
        let column = ReferenceArrayColumn::new("member_ids", "member");
        let value = column.serialize(Value::from(vec!["a", "b"])).unwrap();
        assert_eq!(value, Value::from(vec!["a", "b"]));
        assert!(column.serialize(Value::from("a")).is_err());
        assert_eq!(
            column.deserialize(Value::from(r#"["a","b"]"#)).unwrap(),
            Value::from(vec!["a", "b"])
        );
    }

    #[test]
    fn test_dynamic_reference_roles() {
        let table_name = DynamicReferenceTableNameColumn::new("target_table", "target_id");
        let reference = DynamicReferenceColumn::new("target_id", "target_table");
        assert_eq!(
            table_name.dynamic_reference(),
            Some(DynamicReferenceRole::TableName {
                reference_field: "target_id"
            })
        );
        assert_eq!(
            reference.dynamic_reference(),
            Some(DynamicReferenceRole::Reference {
                table_name_field: "target_table"
            })
        );
    }

    #[test]
    fn test_push_id_dedupes() {
        let mut ids = Vec::new();
        push_id(&mut ids, Some(&Value::from("a")));
        push_id(&mut ids, Some(&Value::from("a")));
        push_id(&mut ids, Some(&Value::Null));
        push_id(&mut ids, None);
        assert_eq!(ids, vec!["a".to_string()]);
    }
}
