//! Live schema introspection.
//!
//! A driver implements [`SchemaMetadata`] to describe what actually exists
//! in the database. [`LiveTableSchema`] gathers everything the diff needs
//! about one table in a single pass.

use tabula_core::DbResult;

/// One live column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    /// The type as reported by the backend, e.g. `TEXT` or `STRING(MAX)`.
    pub data_type: String,
    pub nullable: bool,
}

/// One live foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyMetadata {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// Backends without named constraints leave this empty.
    pub constraint_name: Option<String>,
}

/// One live index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub name: String,
    /// Physical column names, in index order.
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Read-only introspection of a live backend.
#[async_trait::async_trait]
pub trait SchemaMetadata: Send + Sync {
    async fn table_exists(&self, table: &str) -> DbResult<bool>;

    async fn column_metadata(&self, table: &str) -> DbResult<Vec<ColumnMetadata>>;

    /// Columns carrying a single-column unique constraint.
    async fn unique_columns(&self, table: &str) -> DbResult<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyMetadata>>;

    async fn indexes(&self, table: &str) -> DbResult<Vec<IndexMetadata>>;
}

/// Everything known about one live table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTableSchema {
    pub columns: Vec<ColumnMetadata>,
    pub unique_columns: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    pub indexes: Vec<IndexMetadata>,
}

impl LiveTableSchema {
    /// Reads the live schema of `table`.
    pub async fn load(metadata: &dyn SchemaMetadata, table: &str) -> DbResult<Self> {
        Ok(Self {
            columns: metadata.column_metadata(table).await?,
            unique_columns: metadata.unique_columns(table).await?,
            foreign_keys: metadata.foreign_keys(table).await?,
            indexes: metadata.indexes(table).await?,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_unique(&self, column: &str) -> bool {
        self.unique_columns.iter().any(|unique| unique == column)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyMetadata> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}
