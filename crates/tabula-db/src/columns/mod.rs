//! Column definitions.
//!
//! A column maps one logical record field to one physical database column.
//! Every column kind implements the [`Column`] trait; behavior shared by all
//! kinds (options, rename hints, default and update values, query scoping)
//! lives in [`ColumnBase`] and is configured through [`ConfigureColumn`].
//!
//! - [`types`] - Scalar kinds (integer, string, date-time, JSON, ...)
//! - [`references`] - Reference kinds, which take part in cascade deletes

pub mod references;
pub mod types;

use std::fmt;
use std::sync::Arc;

use tabula_core::DbResult;

use crate::db::Db;
use crate::query::builder::QueryBuilder;
use crate::record::Record;
use crate::value::Value;

pub use references::{
    DynamicReferenceColumn, DynamicReferenceTableNameColumn, ReferenceArrayColumn,
    ReferenceColumn,
};
pub use types::{
    ArrayColumn, BigIntegerColumn, BinaryColumn, BooleanColumn, DateColumn, DateTimeColumn,
    DecimalColumn, FloatColumn, IntegerColumn, ObjectColumn, StringColumn, TextColumn,
    UuidColumn,
};

/// Computes a value for a record; `None` leaves the field untouched.
pub type ValueFn = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Adds predicates to every query issued against the column's table.
pub type AddToQueryFn = Arc<dyn Fn(&mut QueryBuilder) -> DbResult<()> + Send + Sync>;

/// The storage kind of a column, mapped to a native type by each driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    String { max_length: Option<usize> },
    Text,
    Float,
    Decimal { precision: u32, scale: u32 },
    Boolean,
    Date,
    DateTime,
    Binary,
    Uuid,
    Object,
    Array(Box<ColumnType>),
    Reference,
    ReferenceArray,
    DynamicReferenceTableName,
    DynamicReference,
}

/// A foreign-key target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyReference {
    pub table: String,
    pub column: String,
}

impl ForeignKeyReference {
    /// A reference to the `id` column of `table`.
    pub fn to_id(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: crate::record::ID_FIELD.to_string(),
        }
    }
}

/// Options shared by every column kind.
#[derive(Clone)]
pub struct ColumnOptions {
    /// Defaults to `true`; primary-key columns are never nullable.
    pub nullable: bool,
    pub unique: bool,
    pub references: Option<ForeignKeyReference>,
    /// Computed on insert when the field is absent.
    pub default_value: Option<ValueFn>,
    /// Computed on every update.
    pub update_value: Option<ValueFn>,
    /// Makes the default value win over a caller-supplied value.
    pub force_default_value: bool,
    pub add_to_query: Option<AddToQueryFn>,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            nullable: true,
            unique: false,
            references: None,
            default_value: None,
            update_value: None,
            force_default_value: false,
            add_to_query: None,
        }
    }
}

impl fmt::Debug for ColumnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnOptions")
            .field("nullable", &self.nullable)
            .field("unique", &self.unique)
            .field("references", &self.references)
            .field("default_value", &self.default_value.is_some())
            .field("update_value", &self.update_value.is_some())
            .field("force_default_value", &self.force_default_value)
            .field("add_to_query", &self.add_to_query.is_some())
            .finish()
    }
}

/// State every column kind carries.
#[derive(Debug, Clone)]
pub struct ColumnBase {
    pub name: String,
    pub old_name: Option<String>,
    pub options: ColumnOptions,
    /// Set on the record columns (`id`, `created`, `updated`), whose
    /// defaults are computed before any custom column's.
    pub builtin: bool,
}

impl ColumnBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            old_name: None,
            options: ColumnOptions::default(),
            builtin: false,
        }
    }
}

/// The role a column plays in a dynamic reference pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicReferenceRole<'a> {
    /// Stores a table name; names the field holding the row id.
    TableName { reference_field: &'a str },
    /// Stores a row id; names the field holding the table name.
    Reference { table_name_field: &'a str },
}

/// One column kind.
///
/// Only [`base`](Column::base) and [`column_type`](Column::column_type) are
/// required; every other method has a default that either reads the base
/// or does nothing.
#[async_trait::async_trait]
pub trait Column: Send + Sync + fmt::Debug {
    fn base(&self) -> &ColumnBase;

    fn column_type(&self) -> ColumnType;

    /// The physical column name.
    fn name(&self) -> &str {
        &self.base().name
    }

    /// The previous physical name, used to detect renames.
    fn old_name(&self) -> Option<&str> {
        self.base().old_name.as_deref()
    }

    fn options(&self) -> &ColumnOptions {
        &self.base().options
    }

    fn is_builtin(&self) -> bool {
        self.base().builtin
    }

    /// Converts a field value into its storable form.
    fn serialize(&self, value: Value) -> DbResult<Value> {
        Ok(value)
    }

    /// Converts a stored value back into a field value.
    fn deserialize(&self, value: Value) -> DbResult<Value> {
        Ok(value)
    }

    fn default_value(&self, record: &Record) -> Option<Value> {
        self.options()
            .default_value
            .as_ref()
            .and_then(|compute| compute(record))
    }

    fn update_value(&self, record: &Record) -> Option<Value> {
        self.options()
            .update_value
            .as_ref()
            .and_then(|compute| compute(record))
    }

    fn add_to_query(&self, query: &mut QueryBuilder) -> DbResult<()> {
        match &self.options().add_to_query {
            Some(add) => add(query),
            None => Ok(()),
        }
    }

    /// Runs before the records holding this column are deleted.
    async fn before_delete(&self, _field: &str, _records: &[Record], _db: &Db) -> DbResult<()> {
        Ok(())
    }

    /// The table a static reference column points at.
    fn reference_target(&self) -> Option<&str> {
        None
    }

    fn dynamic_reference(&self) -> Option<DynamicReferenceRole<'_>> {
        None
    }

    /// Whether deleting a referenced row deletes the rows holding this
    /// column (see [`ReferenceColumn::reverse_cascade_delete`]).
    fn reverse_cascade_delete(&self) -> bool {
        false
    }
}

/// Builder methods shared by every column kind.
pub trait ConfigureColumn: Sized {
    fn base_mut(&mut self) -> &mut ColumnBase;

    #[must_use]
    fn not_null(mut self) -> Self {
        self.base_mut().options.nullable = false;
        self
    }

    #[must_use]
    fn unique(mut self) -> Self {
        self.base_mut().options.unique = true;
        self
    }

    /// Records the column's previous physical name.
    #[must_use]
    fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.base_mut().old_name = Some(old_name.into());
        self
    }

    #[must_use]
    fn references(mut self, reference: ForeignKeyReference) -> Self {
        self.base_mut().options.references = Some(reference);
        self
    }

    #[must_use]
    fn with_default(
        mut self,
        compute: impl Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.base_mut().options.default_value = Some(Arc::new(compute));
        self
    }

    #[must_use]
    fn with_update(
        mut self,
        compute: impl Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.base_mut().options.update_value = Some(Arc::new(compute));
        self
    }

    #[must_use]
    fn force_default_value(mut self) -> Self {
        self.base_mut().options.force_default_value = true;
        self
    }

    #[must_use]
    fn with_query_scope(
        mut self,
        add: impl Fn(&mut QueryBuilder) -> DbResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.base_mut().options.add_to_query = Some(Arc::new(add));
        self
    }

    #[must_use]
    fn builtin(mut self) -> Self {
        self.base_mut().builtin = true;
        self
    }
}
