//! Bringing live tables in line with their declarations.

use std::fmt;
use std::sync::Arc;

use tabula_core::DbResult;
use tabula_db::driver::DbDriver;
use tabula_db::registry::TableRegistry;
use tabula_db::table::Table;

use crate::changes::TableChanges;
use crate::diff::diff_table;
use crate::metadata::{LiveTableSchema, SchemaMetadata};
use crate::operations::{ColumnTypeMapper, SchemaOperations};

/// What [`TableManager::load_table`] did to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Created,
    Altered(TableChanges),
    Unchanged,
}

/// Creates missing tables and alters drifted ones.
#[derive(Clone)]
pub struct TableManager {
    metadata: Arc<dyn SchemaMetadata>,
    operations: Arc<dyn SchemaOperations>,
    types: Arc<dyn ColumnTypeMapper>,
}

impl fmt::Debug for TableManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableManager").finish_non_exhaustive()
    }
}

impl TableManager {
    pub fn new(
        metadata: Arc<dyn SchemaMetadata>,
        operations: Arc<dyn SchemaOperations>,
        types: Arc<dyn ColumnTypeMapper>,
    ) -> Self {
        Self {
            metadata,
            operations,
            types,
        }
    }

    /// Loads every table in order.
    ///
    /// Dynamic reference pairing is checked for all tables before any DDL
    /// is issued, so a bad declaration leaves the backend untouched.
    pub async fn load_tables(&self, tables: &[Arc<Table>]) -> DbResult<Vec<(String, LoadOutcome)>> {
        for table in tables {
            table.validate_dynamic_references()?;
        }
        let mut outcomes = Vec::with_capacity(tables.len());
        for table in tables {
            let outcome = self.apply(table).await?;
            outcomes.push((table.name().to_string(), outcome));
        }
        Ok(outcomes)
    }

    pub async fn load_table(&self, table: &Table) -> DbResult<LoadOutcome> {
        table.validate_dynamic_references()?;
        self.apply(table).await
    }

    /// The changes `load_table` would apply to an existing table.
    pub async fn table_changes(&self, table: &Table) -> DbResult<TableChanges> {
        let live = LiveTableSchema::load(self.metadata.as_ref(), table.name()).await?;
        Ok(diff_table(table, &live, self.types.as_ref()))
    }

    async fn apply(&self, table: &Table) -> DbResult<LoadOutcome> {
        if !self.metadata.table_exists(table.name()).await? {
            self.operations.create_table(table).await?;
            tracing::info!(table = table.name(), "Created table");
            return Ok(LoadOutcome::Created);
        }

        let changes = self.table_changes(table).await?;
        if changes.is_empty() {
            tracing::debug!(table = table.name(), "Table is up to date");
            return Ok(LoadOutcome::Unchanged);
        }
        self.operations.alter_table(table, &changes).await?;
        tracing::info!(
            table = table.name(),
            created = changes.columns_to_create.len(),
            altered = changes.columns_to_alter.len(),
            "Altered table"
        );
        Ok(LoadOutcome::Altered(changes))
    }
}

/// A driver that can also manage its own schema.
#[async_trait::async_trait]
pub trait SchemaDriver: DbDriver {
    fn table_manager(&self) -> TableManager;

    /// Creates the database if needed, then loads every registered table.
    async fn init(&self, tables: &TableRegistry) -> DbResult<Vec<(String, LoadOutcome)>> {
        self.create_db_if_not_exists().await?;
        self.table_manager().load_tables(&tables.tables()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::metadata::{ColumnMetadata, ForeignKeyMetadata, IndexMetadata};
    use tabula_core::DbError;
    use tabula_db::columns::{
        ColumnType, ConfigureColumn, DynamicReferenceColumn, StringColumn,
    };

    /// An in-memory backend that records DDL calls.
    #[derive(Default)]
    struct FakeBackend {
        columns: Mutex<Vec<(String, Vec<ColumnMetadata>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn describe(table: &Table) -> Vec<ColumnMetadata> {
        table
            .columns()
            .map(|(field, column)| ColumnMetadata {
                name: column.name().to_string(),
                data_type: "TEXT".into(),
                nullable: column.options().nullable && !table.is_primary_key(field),
            })
            .collect()
    }

    #[async_trait::async_trait]
    impl SchemaMetadata for FakeBackend {
        async fn table_exists(&self, table: &str) -> DbResult<bool> {
            Ok(self.columns.lock().unwrap().iter().any(|(name, _)| name == table))
        }

        async fn column_metadata(&self, table: &str) -> DbResult<Vec<ColumnMetadata>> {
            Ok(self
                .columns
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, columns)| columns.clone())
                .unwrap_or_default())
        }

        async fn unique_columns(&self, _table: &str) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn foreign_keys(&self, _table: &str) -> DbResult<Vec<ForeignKeyMetadata>> {
            Ok(Vec::new())
        }

        async fn indexes(&self, _table: &str) -> DbResult<Vec<IndexMetadata>> {
            Ok(Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl SchemaOperations for FakeBackend {
        async fn create_table(&self, table: &Table) -> DbResult<()> {
            self.calls.lock().unwrap().push(format!("create {}", table.name()));
            self.columns
                .lock()
                .unwrap()
                .push((table.name().to_string(), describe(table)));
            Ok(())
        }

        async fn alter_table(&self, table: &Table, changes: &TableChanges) -> DbResult<()> {
            if !changes.column_type_changes.is_empty() {
                return Err(DbError::Unsupported("type change".into()));
            }
            self.calls.lock().unwrap().push(format!("alter {}", table.name()));
            let mut live = self.columns.lock().unwrap();
            if let Some((_, columns)) = live.iter_mut().find(|(name, _)| name == table.name()) {
                *columns = describe(table);
            }
            Ok(())
        }
    }

    fn manager(backend: &Arc<FakeBackend>) -> TableManager {
        let types: Arc<dyn ColumnTypeMapper> = Arc::new(|_: &ColumnType| "TEXT".to_string());
        TableManager::new(backend.clone(), backend.clone(), types)
    }

    fn employee() -> Table {
        Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_unchanged() {
        let backend = Arc::new(FakeBackend::default());
        let manager = manager(&backend);

        let outcome = manager.load_table(&employee()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Created);
        let outcome = manager.load_table(&employee()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Unchanged);
        assert_eq!(backend.calls(), ["create employee"]);
    }

    #[tokio::test]
    async fn test_new_column_alters() {
        let backend = Arc::new(FakeBackend::default());
        let manager = manager(&backend);
        manager.load_table(&employee()).await.unwrap();

        let wider = Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("title", StringColumn::new("title"))
            .build()
            .unwrap();
        let outcome = manager.load_table(&wider).await.unwrap();
        let LoadOutcome::Altered(changes) = outcome else {
            panic!("expected an alteration, got {outcome:?}");
        };
        assert_eq!(changes.columns_to_create, ["title"]);
        assert_eq!(backend.calls(), ["create employee", "alter employee"]);
    }

    #[tokio::test]
    async fn test_invalid_dynamic_reference_issues_no_ddl() {
        let backend = Arc::new(FakeBackend::default());
        let broken = Table::builder("attachment")
            .column("target_id", DynamicReferenceColumn::new("target_id", "target_table"))
            .build()
            .unwrap();
        let tables = vec![Arc::new(employee()), Arc::new(broken)];

        let err = manager(&backend).load_tables(&tables).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_alteration_surfaces() {
        let backend = Arc::new(FakeBackend::default());
        backend.columns.lock().unwrap().push((
            "employee".into(),
            describe(&employee())
                .into_iter()
                .map(|mut column| {
                    column.data_type = "BLOB".into();
                    column
                })
                .collect(),
        ));
        let err = manager(&backend).load_table(&employee()).await.unwrap_err();
        assert!(matches!(err, DbError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_load_tables_reports_each_table() {
        let backend = Arc::new(FakeBackend::default());
        let other = Table::builder("department")
            .column("title", StringColumn::new("title"))
            .build()
            .unwrap();
        let outcomes = manager(&backend)
            .load_tables(&[Arc::new(employee()), Arc::new(other)])
            .await
            .unwrap();
        let names: Vec<&str> = outcomes.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["employee", "department"]);
        assert!(outcomes.iter().all(|(_, outcome)| *outcome == LoadOutcome::Created));
    }
}
