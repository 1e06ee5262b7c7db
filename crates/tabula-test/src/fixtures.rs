//! Table fixtures shared by the integration tests.

use std::sync::Arc;

use tabula_core::{DatabaseSettings, DbResult};
use tabula_db::columns::{
    ConfigureColumn, DynamicReferenceColumn, DynamicReferenceTableNameColumn, IntegerColumn,
    ReferenceArrayColumn, ReferenceColumn, StringColumn,
};
use tabula_db::db::Db;
use tabula_db::registry::TableRegistry;
use tabula_db::table::Table;
use tabula_db::watchers::WatcherRegistry;
use tabula_db_migrations::SchemaDriver;

use crate::sqlite::SqliteDriver;

/// `employee(name, department, age)` with an index on `department`.
pub fn employee_table() -> DbResult<Table> {
    Table::builder("employee")
        .column("name", StringColumn::new("name").not_null())
        .column("department", StringColumn::new("department"))
        .column("age", IntegerColumn::new("age"))
        .index(["department"])
        .build()
}

/// Tables wired together by every kind of cascade.
///
/// - `membership.member` cascades to `member`; `guest_pass.member` does not.
/// - `badge.member` is a reverse cascade: deleting a member deletes its
///   badges.
/// - `team` declares `roster.team` as a forward cascade.
/// - `playlist.members` is a cascading list of members.
/// - `attachment` points at any table through a dynamic reference pair.
pub fn cascade_tables() -> DbResult<Vec<Table>> {
    Ok(vec![
        Table::builder("member")
            .column("name", StringColumn::new("name"))
            .build()?,
        Table::builder("membership")
            .column("member", ReferenceColumn::new("member_id", "member").cascade_delete())
            .build()?,
        Table::builder("guest_pass")
            .column("member", ReferenceColumn::new("member_id", "member"))
            .build()?,
        Table::builder("badge")
            .column(
                "member",
                ReferenceColumn::new("member_id", "member").reverse_cascade_delete(),
            )
            .column("label", StringColumn::new("label"))
            .build()?,
        Table::builder("team")
            .column("name", StringColumn::new("name"))
            .cascade_delete_reference("roster", "team")
            .build()?,
        Table::builder("roster")
            .column("team", StringColumn::new("team_id"))
            .column("player", StringColumn::new("player"))
            .build()?,
        Table::builder("playlist")
            .column(
                "members",
                ReferenceArrayColumn::new("member_ids", "member").cascade_delete(),
            )
            .build()?,
        Table::builder("attachment")
            .column(
                "target_table",
                DynamicReferenceTableNameColumn::new("target_table", "target"),
            )
            .column(
                "target",
                DynamicReferenceColumn::new("target_id", "target_table").cascade_delete(),
            )
            .build()?,
    ])
}

/// `node(name, parent)` where `parent` cascades to another node, possibly
/// the row itself.
pub fn tree_table() -> DbResult<Table> {
    Table::builder("node")
        .column("name", StringColumn::new("name"))
        .column("parent", ReferenceColumn::new("parent_id", "node").cascade_delete())
        .build()
}

/// A [`Db`] over a fresh temporary SQLite database with `tables` created.
///
/// The driver is returned alongside so tests can reach the schema and keep
/// the database file alive.
pub async fn sqlite_db(tables: Vec<Table>) -> DbResult<(Arc<SqliteDriver>, Db)> {
    sqlite_db_with(&DatabaseSettings::default(), tables).await
}

/// Like [`sqlite_db`], with the driver configured from `settings`.
pub async fn sqlite_db_with(
    settings: &DatabaseSettings,
    tables: Vec<Table>,
) -> DbResult<(Arc<SqliteDriver>, Db)> {
    let driver = Arc::new(SqliteDriver::open(settings)?);
    let registry = Arc::new(TableRegistry::with_tables(tables));
    driver.init(&registry).await?;
    let db = Db::new(driver.clone(), registry, Arc::new(WatcherRegistry::new()));
    Ok((driver, db))
}
