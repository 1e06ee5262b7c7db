//! Table definitions.
//!
//! A [`Table`] is the declared shape of one row type: its ordered columns,
//! primary key, indexes and cascade rules. Tables are assembled with a
//! [`TableBuilder`], which checks the structural invariants up front so the
//! rest of the crate can rely on them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tabula_core::{DbError, DbResult};

use crate::columns::{
    Column, ConfigureColumn, DateTimeColumn, DynamicReferenceRole, StringColumn,
};
use crate::record::{CREATED_FIELD, ID_FIELD, UPDATED_FIELD};
use crate::value::Value;

/// A secondary index over one or more logical fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Logical field names, in index order.
    pub columns: Vec<String>,
    pub name: Option<String>,
}

impl Index {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Another table holding a reference to this one.
///
/// Deleting rows of this table deletes the rows of `table` whose
/// `reference_column` holds one of the deleted ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeDeleteReference {
    pub table: String,
    /// Logical field name in `table`.
    pub reference_column: String,
}

impl CascadeDeleteReference {
    pub fn new(table: impl Into<String>, reference_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            reference_column: reference_column.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceRecordOptions {
    /// Keeps the matched rows in place on delete while still running hooks
    /// and cascades, for tables whose rows are removed by other means.
    pub do_not_delete_source_records_from_db: bool,
}

/// The declared shape of one table.
#[derive(Clone)]
pub struct Table {
    name: String,
    columns: Vec<(String, Arc<dyn Column>)>,
    primary_key: Vec<String>,
    indexes: Vec<Index>,
    cascade_delete_references: Vec<CascadeDeleteReference>,
    source_record_options: SourceRecordOptions,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field(
                "columns",
                &self.columns.iter().map(|(field, _)| field).collect::<Vec<_>>(),
            )
            .field("primary_key", &self.primary_key)
            .field("indexes", &self.indexes)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Starts a table definition.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order, keyed by logical field name.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Arc<dyn Column>)> {
        self.columns
            .iter()
            .map(|(field, column)| (field.as_str(), column))
    }

    pub fn column(&self, field: &str) -> Option<&Arc<dyn Column>> {
        self.columns
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, column)| column)
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.column(field).is_some()
    }

    /// The physical column name of a logical field.
    pub fn physical_name(&self, field: &str) -> Option<&str> {
        self.column(field).map(|column| column.name())
    }

    /// The logical field stored in a physical column.
    pub fn field_for_column(&self, physical: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, column)| column.name() == physical)
            .map(|(field, _)| field.as_str())
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn is_primary_key(&self, field: &str) -> bool {
        self.primary_key.iter().any(|key| key == field)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// The tables whose rows are deleted along with rows of this one.
    pub fn cascade_delete_references(&self) -> &[CascadeDeleteReference] {
        &self.cascade_delete_references
    }

    pub const fn source_record_options(&self) -> SourceRecordOptions {
        self.source_record_options
    }

    /// Checks that dynamic reference columns come in matched pairs.
    ///
    /// Every reference column must name a table name column that names it
    /// back, and every table name column must be claimed by exactly one
    /// reference column.
    pub fn validate_dynamic_references(&self) -> DbResult<()> {
        for (field, column) in &self.columns {
            match column.dynamic_reference() {
                Some(DynamicReferenceRole::Reference { table_name_field }) => {
                    let paired = self
                        .column(table_name_field)
                        .and_then(|companion| companion.dynamic_reference());
                    match paired {
                        Some(DynamicReferenceRole::TableName { reference_field })
                            if reference_field == field.as_str() => {}
                        _ => {
                            return Err(DbError::validation(format!(
                                "Dynamic reference '{field}' on table '{}' names table name \
                                 field '{table_name_field}', which does not refer back to it",
                                self.name
                            )));
                        }
                    }
                }
                Some(DynamicReferenceRole::TableName { .. }) => {
                    let claims = self
                        .columns
                        .iter()
                        .filter(|(_, other)| {
                            matches!(
                                other.dynamic_reference(),
                                Some(DynamicReferenceRole::Reference { table_name_field })
                                    if table_name_field == field.as_str()
                            )
                        })
                        .count();
                    if claims != 1 {
                        return Err(DbError::validation(format!(
                            "Table name field '{field}' on table '{}' is claimed by {claims} \
                             dynamic references, expected exactly one",
                            self.name
                        )));
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn now() -> Value {
    Value::DateTimeTz(chrono::Utc::now())
}

/// The `id`, `created` and `updated` columns every record carries.
fn record_columns() -> Vec<(String, Arc<dyn Column>)> {
    let id: Arc<dyn Column> = Arc::new(
        StringColumn::new(ID_FIELD)
            .not_null()
            .builtin()
            .with_default(|_| Some(Value::String(uuid::Uuid::new_v4().simple().to_string()))),
    );
    let created: Arc<dyn Column> = Arc::new(
        DateTimeColumn::new(CREATED_FIELD)
            .builtin()
            .with_default(|_| Some(now())),
    );
    let updated: Arc<dyn Column> = Arc::new(
        DateTimeColumn::new(UPDATED_FIELD)
            .builtin()
            .with_default(|_| Some(now()))
            .with_update(|_| Some(now())),
    );
    vec![
        (ID_FIELD.to_string(), id),
        (CREATED_FIELD.to_string(), created),
        (UPDATED_FIELD.to_string(), updated),
    ]
}

/// Assembles a [`Table`].
///
/// # Examples
///
/// ```
/// use tabula_db::columns::{ConfigureColumn, StringColumn};
/// use tabula_db::table::Table;
///
/// let table = Table::builder("employee")
///     .column("name", StringColumn::new("name").not_null())
///     .column("department", StringColumn::new("department"))
///     .index(["department"])
///     .build()
///     .unwrap();
///
/// assert_eq!(table.primary_key(), ["id"]);
/// assert!(table.has_column("created"));
/// ```
pub struct TableBuilder {
    name: String,
    columns: Vec<(String, Arc<dyn Column>)>,
    primary_key: Option<Vec<String>>,
    indexes: Vec<Index>,
    cascade_delete_references: Vec<CascadeDeleteReference>,
    source_record_options: SourceRecordOptions,
    record_columns: bool,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            cascade_delete_references: Vec::new(),
            source_record_options: SourceRecordOptions::default(),
            record_columns: true,
        }
    }

    #[must_use]
    pub fn column(mut self, field: impl Into<String>, column: impl Column + 'static) -> Self {
        self.columns.push((field.into(), Arc::new(column)));
        self
    }

    #[must_use]
    pub fn shared_column(mut self, field: impl Into<String>, column: Arc<dyn Column>) -> Self {
        self.columns.push((field.into(), column));
        self
    }

    #[must_use]
    pub fn primary_key<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn index<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.indexes.push(Index::new(fields));
        self
    }

    #[must_use]
    pub fn named_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn cascade_delete_reference(
        mut self,
        table: impl Into<String>,
        reference_column: impl Into<String>,
    ) -> Self {
        self.cascade_delete_references
            .push(CascadeDeleteReference::new(table, reference_column));
        self
    }

    #[must_use]
    pub const fn source_record_options(mut self, options: SourceRecordOptions) -> Self {
        self.source_record_options = options;
        self
    }

    /// Skips the automatic `id`, `created` and `updated` columns.
    #[must_use]
    pub const fn without_record_columns(mut self) -> Self {
        self.record_columns = false;
        self
    }

    pub fn build(self) -> DbResult<Table> {
        let mut columns = Vec::with_capacity(self.columns.len() + 3);
        if self.record_columns {
            for (field, column) in record_columns() {
                if !self.columns.iter().any(|(declared, _)| *declared == field) {
                    columns.push((field, column));
                }
            }
        }
        columns.extend(self.columns);

        let mut fields = HashSet::new();
        let mut physical = HashSet::new();
        for (field, column) in &columns {
            if !fields.insert(field.as_str()) {
                return Err(DbError::validation(format!(
                    "Table '{}' declares field '{field}' twice",
                    self.name
                )));
            }
            if !physical.insert(column.name()) {
                return Err(DbError::validation(format!(
                    "Table '{}' maps more than one field to column '{}'",
                    self.name,
                    column.name()
                )));
            }
        }

        let primary_key = self
            .primary_key
            .unwrap_or_else(|| vec![ID_FIELD.to_string()]);
        if primary_key.is_empty() {
            return Err(DbError::validation(format!(
                "Table '{}' has an empty primary key",
                self.name
            )));
        }
        let undeclared = primary_key
            .iter()
            .chain(self.indexes.iter().flat_map(|index| index.columns.iter()))
            .find(|field| !fields.contains(field.as_str()));
        if let Some(field) = undeclared {
            return Err(DbError::validation(format!(
                "Table '{}' references undeclared field '{field}' in a key or index",
                self.name
            )));
        }
        if let Some(index) = self.indexes.iter().find(|index| index.columns.is_empty()) {
            return Err(DbError::validation(format!(
                "Table '{}' declares an index without columns ({:?})",
                self.name, index.name
            )));
        }

        Ok(Table {
            name: self.name,
            columns,
            primary_key,
            indexes: self.indexes,
            cascade_delete_references: self.cascade_delete_references,
            source_record_options: self.source_record_options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{
        DynamicReferenceColumn, DynamicReferenceTableNameColumn, IntegerColumn,
    };
    use crate::record::Record;

    fn employee() -> Table {
        Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("department", StringColumn::new("dept"))
            .column("age", IntegerColumn::new("age"))
            .index(["department", "age"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_record_columns_come_first() {
        let table = employee();
        let fields: Vec<&str> = table.columns().map(|(field, _)| field).collect();
        assert_eq!(fields, ["id", "created", "updated", "name", "department", "age"]);
        assert!(table.column("id").unwrap().is_builtin());
        assert!(!table.column("name").unwrap().is_builtin());
    }

    #[test]
    fn test_without_record_columns() {
        let table = Table::builder("plain")
            .without_record_columns()
            .column("code", StringColumn::new("code"))
            .primary_key(["code"])
            .build()
            .unwrap();
        assert!(!table.has_column("id"));
        assert_eq!(table.primary_key(), ["code"]);
    }

    #[test]
    fn test_declared_id_replaces_record_column() {
        let table = Table::builder("custom")
            .column("id", IntegerColumn::new("id"))
            .build()
            .unwrap();
        let ids = table.columns().filter(|(field, _)| *field == "id").count();
        assert_eq!(ids, 1);
        assert_eq!(table.column("id").unwrap().name(), "id");
        assert!(!table.column("id").unwrap().is_builtin());
    }

    #[test]
    fn test_generated_ids_are_simple_uuids() {
        let table = employee();
        let id = table.column("id").unwrap().default_value(&Record::new()).unwrap();
        let id = id.as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_physical_names() {
        let table = employee();
        assert_eq!(table.physical_name("department"), Some("dept"));
        assert_eq!(table.field_for_column("dept"), Some("department"));
        assert_eq!(table.physical_name("missing"), None);
    }

    #[test]
    fn test_duplicate_physical_name_rejected() {
        let err = Table::builder("dup")
            .column("a", StringColumn::new("shared"))
            .column("b", StringColumn::new("shared"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("shared"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Table::builder("dup")
            .column("a", StringColumn::new("a"))
            .column("a", StringColumn::new("b"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_undeclared_index_field_rejected() {
        let result = Table::builder("bad").index(["missing"]).build();
        assert!(result.is_err());
        let result = Table::builder("bad").primary_key(["missing"]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_dynamic_references_paired() {
        let table = Table::builder("attachment")
            .column(
                "target_table",
                DynamicReferenceTableNameColumn::new("target_table", "target_id"),
            )
            .column(
                "target_id",
                DynamicReferenceColumn::new("target_id", "target_table"),
            )
            .build()
            .unwrap();
        assert!(table.validate_dynamic_references().is_ok());
    }

    #[test]
    fn test_dynamic_reference_missing_companion() {
        let table = Table::builder("attachment")
            .column(
                "target_id",
                DynamicReferenceColumn::new("target_id", "target_table"),
            )
            .build()
            .unwrap();
        let err = table.validate_dynamic_references().unwrap_err();
        assert!(err.to_string().contains("target_table"));
    }

    #[test]
    fn test_table_name_claimed_twice() {
        let table = Table::builder("attachment")
            .column(
                "target_table",
                DynamicReferenceTableNameColumn::new("target_table", "first_id"),
            )
            .column(
                "first_id",
                DynamicReferenceColumn::new("first_id", "target_table"),
            )
            .column(
                "second_id",
                DynamicReferenceColumn::new("second_id", "target_table"),
            )
            .build()
            .unwrap();
        assert!(table.validate_dynamic_references().is_err());
    }

    #[test]
    fn test_unclaimed_table_name() {
        let table = Table::builder("attachment")
            .column(
                "target_table",
                DynamicReferenceTableNameColumn::new("target_table", "target_id"),
            )
            .column("target_id", StringColumn::new("target_id"))
            .build()
            .unwrap();
        let err = table.validate_dynamic_references().unwrap_err();
        assert!(err.to_string().contains("claimed by 0"));
    }
}
