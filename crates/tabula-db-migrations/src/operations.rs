//! Driver-supplied schema capabilities.

use tabula_core::DbResult;
use tabula_db::columns::ColumnType;
use tabula_db::table::Table;

use crate::changes::TableChanges;

/// Applies structural changes to a live backend.
///
/// Implementations must refuse changes they cannot apply faithfully with
/// [`DbError::Unsupported`](tabula_core::DbError::Unsupported) instead of
/// emitting lossy DDL.
#[async_trait::async_trait]
pub trait SchemaOperations: Send + Sync {
    async fn create_table(&self, table: &Table) -> DbResult<()>;

    async fn alter_table(&self, table: &Table, changes: &TableChanges) -> DbResult<()>;
}

/// Maps a declared column type to the type the backend reports for it.
pub trait ColumnTypeMapper: Send + Sync {
    fn sql_type(&self, column_type: &ColumnType) -> String;
}

impl<F> ColumnTypeMapper for F
where
    F: Fn(&ColumnType) -> String + Send + Sync,
{
    fn sql_type(&self, column_type: &ColumnType) -> String {
        self(column_type)
    }
}
