//! The table registry.
//!
//! Tables are registered once at the composition root and shared through an
//! `Arc<TableRegistry>`. Lookups are read-mostly.

use std::sync::{Arc, PoisonError, RwLock};

use tabula_core::{DbError, DbResult};

use crate::table::{CascadeDeleteReference, Table};

/// All tables known to a [`Db`](crate::db::Db).
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: RwLock<Vec<Arc<Table>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry holding `tables`.
    pub fn with_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let registry = Self::new();
        for table in tables {
            registry.register(table);
        }
        registry
    }

    /// Registers a table, replacing any table with the same name.
    pub fn register(&self, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.retain(|existing| existing.name() != table.name());
        tables.push(Arc::clone(&table));
        table
    }

    pub fn try_get(&self, name: &str) -> Option<Arc<Table>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|table| table.name() == name)
            .cloned()
    }

    /// Returns the named table, or a validation error if it is unknown.
    pub fn get(&self, name: &str) -> DbResult<Arc<Table>> {
        self.try_get(name)
            .ok_or_else(|| DbError::validation(format!("Unknown table '{name}'")))
    }

    /// All tables in registration order.
    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps a logical field to its physical column; unknown tables and
    /// fields map to themselves.
    pub fn physical_name(&self, table: &str, field: &str) -> String {
        self.try_get(table)
            .and_then(|table| table.physical_name(field).map(str::to_string))
            .unwrap_or_else(|| field.to_string())
    }

    /// The references to delete along with rows of `table`.
    ///
    /// Includes the table's declared references followed by one reference
    /// per reverse-cascading reference column in any registered table that
    /// points at `table`. Duplicates are dropped.
    pub fn cascade_delete_references(&self, table: &Table) -> Vec<CascadeDeleteReference> {
        let mut references = table.cascade_delete_references().to_vec();
        for holder in self.tables() {
            for (field, column) in holder.columns() {
                if !column.reverse_cascade_delete() {
                    continue;
                }
                let points_here = column
                    .reference_target()
                    .is_some_and(|target| target == table.name());
                let reference = CascadeDeleteReference::new(holder.name(), field);
                if points_here && !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }
        references
    }
}
