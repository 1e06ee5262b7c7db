//! SQLite schema introspection and DDL.
//!
//! SQLite's `ALTER TABLE` can rename and add columns but cannot change a
//! column's type or nullability, nor add or drop a foreign key on an
//! existing column. [`SqliteSchema`] refuses those changes with
//! [`DbError::Unsupported`] before issuing any statement.

use std::sync::Arc;

use rusqlite::Connection;
use tabula_core::{DbError, DbResult};
use tabula_db::columns::{Column, ColumnType};
use tabula_db::table::{Index, Table};
use tabula_db_migrations::{
    ColumnMetadata, ForeignKeyMetadata, IndexMetadata, SchemaMetadata, SchemaOperations,
    TableChanges,
};
use tokio::sync::Mutex;

use crate::sqlite::with_connection;

/// The type SQLite reports for a declared column type.
pub fn sqlite_type(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Integer | ColumnType::BigInteger | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Binary => "BLOB",
        _ => "TEXT",
    }
    .to_string()
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn driver_error(e: rusqlite::Error) -> DbError {
    DbError::Database(e.to_string())
}

/// A live index together with how SQLite created it: `c` for
/// `CREATE INDEX`, `u` for an inline `UNIQUE`, `pk` for the primary key.
struct LiveIndex {
    metadata: IndexMetadata,
    origin: String,
}

fn live_indexes(conn: &Connection, table: &str) -> DbResult<Vec<LiveIndex>> {
    let mut list = conn
        .prepare("SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY seq")
        .map_err(driver_error)?;
    let entries = list
        .query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? != 0,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(driver_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(driver_error)?;

    let mut info = conn
        .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
        .map_err(driver_error)?;
    let mut indexes = Vec::with_capacity(entries.len());
    for (name, unique, origin) in entries {
        let columns = info
            .query_map([&name], |row| row.get::<_, String>(0))
            .map_err(driver_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(driver_error)?;
        indexes.push(LiveIndex {
            metadata: IndexMetadata {
                name,
                columns,
                unique,
            },
            origin,
        });
    }
    Ok(indexes)
}

fn column_definition(table: &Table, field: &str, column: &dyn Column) -> String {
    let options = column.options();
    let mut definition = format!(
        "{} {}",
        quote(column.name()),
        sqlite_type(&column.column_type())
    );
    let is_primary_key = table.is_primary_key(field);
    if !options.nullable || is_primary_key {
        definition.push_str(" NOT NULL");
    }
    if options.unique && !is_primary_key {
        definition.push_str(" UNIQUE");
    }
    if let Some(reference) = &options.references {
        definition.push_str(&format!(
            " REFERENCES {}({})",
            quote(&reference.table),
            quote(&reference.column)
        ));
    }
    definition
}

fn physical_columns(table: &Table, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|field| table.physical_name(field).unwrap_or(field).to_string())
        .collect()
}

fn create_index_sql(table: &Table, index: &Index) -> String {
    let columns = physical_columns(table, &index.columns);
    let name = index
        .name
        .clone()
        .unwrap_or_else(|| format!("ix_{}_{}", table.name(), columns.join("_")));
    format!(
        "CREATE INDEX {} ON {} ({});",
        quote(&name),
        quote(table.name()),
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
    )
}

fn unique_index_sql(table: &str, column: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX {} ON {} ({});",
        quote(&format!("UQ_{table}_{column}")),
        quote(table),
        quote(column)
    )
}

fn field_column<'a>(table: &'a Table, field: &str) -> DbResult<&'a Arc<dyn Column>> {
    table.column(field).ok_or_else(|| {
        DbError::validation(format!(
            "Table '{}' has no field '{field}'",
            table.name()
        ))
    })
}

fn refuse_unsupported(table: &Table, changes: &TableChanges) -> DbResult<()> {
    let name = table.name();
    if let Some(change) = changes.column_type_changes.first() {
        return Err(DbError::Unsupported(format!(
            "SQLite cannot change column '{}' of table '{name}' from {} to {}",
            change.field, change.from, change.to
        )));
    }
    if let Some(change) = changes.column_nullable_changes.first() {
        return Err(DbError::Unsupported(format!(
            "SQLite cannot change the nullability of column '{}' of table '{name}'",
            change.field
        )));
    }
    if !changes.foreign_keys_to_create.is_empty() || !changes.foreign_keys_to_drop.is_empty() {
        return Err(DbError::Unsupported(format!(
            "SQLite cannot add or drop foreign keys on existing columns of table '{name}'"
        )));
    }
    for field in &changes.columns_to_create {
        if !field_column(table, field)?.options().nullable {
            return Err(DbError::Unsupported(format!(
                "SQLite cannot add NOT NULL column '{field}' to table '{name}' without a default"
            )));
        }
    }
    Ok(())
}

fn alter_statements(
    conn: &Connection,
    table: &Table,
    changes: &TableChanges,
) -> DbResult<Vec<String>> {
    let name = table.name();
    let mut statements = Vec::new();

    for rename in &changes.columns_to_rename {
        let column = field_column(table, &rename.field)?;
        statements.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            quote(name),
            quote(&rename.old_name),
            quote(column.name())
        ));
    }

    for field in &changes.columns_to_create {
        let column = field_column(table, field)?;
        let mut definition = column_definition(table, field, column.as_ref());
        // ADD COLUMN cannot carry UNIQUE; a unique index stands in for it.
        if column.options().unique {
            definition = definition.replace(" UNIQUE", "");
            statements.push(format!("ALTER TABLE {} ADD COLUMN {definition};", quote(name)));
            statements.push(unique_index_sql(name, column.name()));
        } else {
            statements.push(format!("ALTER TABLE {} ADD COLUMN {definition};", quote(name)));
        }
    }

    for field in &changes.unique_columns_to_create {
        let column = field_column(table, field)?;
        statements.push(unique_index_sql(name, column.name()));
    }

    let live = live_indexes(conn, name)?;
    for column in &changes.unique_columns_to_drop {
        let backing = live.iter().find(|index| {
            index.metadata.unique && index.metadata.columns == std::slice::from_ref(column)
        });
        match backing {
            Some(index) if index.origin == "c" => {
                statements.push(format!("DROP INDEX {};", quote(&index.metadata.name)));
            }
            _ => {
                return Err(DbError::Unsupported(format!(
                    "SQLite cannot drop the inline unique constraint on column '{column}' of \
                     table '{name}'"
                )));
            }
        }
    }

    for index in &changes.indexes_to_drop {
        statements.push(format!("DROP INDEX {};", quote(&index.name)));
    }
    for index in &changes.indexes_to_create {
        statements.push(create_index_sql(table, index));
    }
    Ok(statements)
}

/// [`SchemaMetadata`] and [`SchemaOperations`] over a SQLite connection.
#[derive(Clone)]
pub struct SqliteSchema {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSchema").finish_non_exhaustive()
    }
}

impl SqliteSchema {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl SchemaMetadata for SqliteSchema {
    async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let table = table.to_string();
        with_connection(&self.conn, move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [&table],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .map_err(driver_error)
        })
        .await
    }

    async fn column_metadata(&self, table: &str) -> DbResult<Vec<ColumnMetadata>> {
        let table = table.to_string();
        with_connection(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")
                .map_err(driver_error)?;
            let rows = stmt
                .query_map([&table], |row| {
                    Ok(ColumnMetadata {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row.get::<_, i64>(2)? == 0,
                    })
                })
                .map_err(driver_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(driver_error);
            rows
        })
        .await
    }

    async fn unique_columns(&self, table: &str) -> DbResult<Vec<String>> {
        let table = table.to_string();
        with_connection(&self.conn, move |conn| {
            Ok(live_indexes(conn, &table)?
                .into_iter()
                .filter(|index| index.metadata.unique && index.origin != "pk")
                .filter_map(|index| match index.metadata.columns.as_slice() {
                    [column] => Some(column.clone()),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    async fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyMetadata>> {
        let table = table.to_string();
        with_connection(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1)")
                .map_err(driver_error)?;
            let rows = stmt
                .query_map([&table], |row| {
                    Ok(ForeignKeyMetadata {
                        column: row.get(0)?,
                        referenced_table: row.get(1)?,
                        referenced_column: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        constraint_name: None,
                    })
                })
                .map_err(driver_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(driver_error);
            rows
        })
        .await
    }

    async fn indexes(&self, table: &str) -> DbResult<Vec<IndexMetadata>> {
        let table = table.to_string();
        with_connection(&self.conn, move |conn| {
            Ok(live_indexes(conn, &table)?
                .into_iter()
                .map(|index| index.metadata)
                .collect())
        })
        .await
    }
}

#[async_trait::async_trait]
impl SchemaOperations for SqliteSchema {
    async fn create_table(&self, table: &Table) -> DbResult<()> {
        let mut definitions: Vec<String> = table
            .columns()
            .map(|(field, column)| column_definition(table, field, column.as_ref()))
            .collect();
        let primary_key = physical_columns(table, table.primary_key());
        definitions.push(format!(
            "PRIMARY KEY ({})",
            primary_key.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
        ));

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote(table.name()),
            definitions.join(", ")
        );
        for index in table.indexes() {
            sql.push_str(&create_index_sql(table, index));
        }
        tracing::debug!(table = table.name(), sql = %sql, "creating table");

        with_connection(&self.conn, move |conn| {
            let transaction = conn.unchecked_transaction().map_err(driver_error)?;
            transaction.execute_batch(&sql).map_err(driver_error)?;
            transaction.commit().map_err(driver_error)
        })
        .await
    }

    async fn alter_table(&self, table: &Table, changes: &TableChanges) -> DbResult<()> {
        refuse_unsupported(table, changes)?;
        let table = table.clone();
        let changes = changes.clone();
        with_connection(&self.conn, move |conn| {
            let statements = alter_statements(conn, &table, &changes)?;
            tracing::debug!(table = table.name(), statements = statements.len(), "altering table");
            let transaction = conn.unchecked_transaction().map_err(driver_error)?;
            transaction
                .execute_batch(&statements.join("\n"))
                .map_err(driver_error)?;
            transaction.commit().map_err(driver_error)
        })
        .await
    }
}
