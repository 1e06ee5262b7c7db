//! # tabula
//!
//! A database-engine-agnostic ORM core.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `tabula` to get everything, or on the individual
//! crates for finer-grained control.

/// Errors, settings and logging.
pub use tabula_core as core;

/// Tables, columns, records, the query AST and the `Db` orchestrator.
pub use tabula_db as db;

/// Schema introspection, diffing and the table manager.
#[cfg(feature = "migrations")]
pub use tabula_db_migrations as migrations;

/// The SQLite reference driver and table fixtures.
#[cfg(feature = "testing")]
pub use tabula_test as test;

/// The types most applications need.
pub mod prelude {
    pub use tabula_core::{DbError, DbResult, Settings};
    pub use tabula_db::columns::ConfigureColumn;
    pub use tabula_db::{
        Condition, Db, DbDriver, Operator, Query, QueryBuilder, Record, Table, TableRegistry,
        TableWatcher, Value, WatcherRegistry,
    };

    #[cfg(feature = "migrations")]
    pub use tabula_db_migrations::{SchemaDriver, TableManager};
}

// Third-party crates applications usually need alongside tabula.
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
