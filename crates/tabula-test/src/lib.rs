//! # tabula-test
//!
//! Testing support for tabula. Provides [`SqliteDriver`](sqlite::SqliteDriver),
//! a reference [`DbDriver`](tabula_db::driver::DbDriver) over a temporary
//! SQLite file that also manages its own schema, and the table fixtures the
//! integration tests share.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::format_push_string)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::significant_drop_tightening)]

pub mod fixtures;
pub mod schema;
pub mod sqlite;

pub use schema::{sqlite_type, SqliteSchema};
pub use sqlite::{SqliteDriver, SqliteTransaction};
