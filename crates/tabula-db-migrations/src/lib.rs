//! # tabula-db-migrations
//!
//! Schema management for tabula. Declared [`Table`](tabula_db::table::Table)s
//! are compared against what a backend reports and the difference is applied
//! in place: missing tables are created, drifted ones altered.
//!
//! ## Architecture
//!
//! - A driver describes its live schema through [`SchemaMetadata`].
//! - [`diff_table`] turns a declaration plus a [`LiveTableSchema`] into
//!   [`TableChanges`] without touching the backend.
//! - The driver applies those changes through [`SchemaOperations`], refusing
//!   the ones it cannot express.
//! - [`TableManager`] ties the three together.
//!
//! ## Module Overview
//!
//! - [`metadata`] - `SchemaMetadata`, `LiveTableSchema` and the metadata rows
//! - [`operations`] - `SchemaOperations`, `ColumnTypeMapper`
//! - [`changes`] - `TableChanges`
//! - [`diff`] - `diff_table`
//! - [`manager`] - `TableManager`, `LoadOutcome`, `SchemaDriver`

// Clippy overrides appropriate for a schema management crate.
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cognitive_complexity)]

pub mod changes;
pub mod diff;
pub mod manager;
pub mod metadata;
pub mod operations;

pub use changes::{ColumnNullableChange, ColumnRename, ColumnTypeChange, TableChanges};
pub use diff::diff_table;
pub use manager::{LoadOutcome, SchemaDriver, TableManager};
pub use metadata::{
    ColumnMetadata, ForeignKeyMetadata, IndexMetadata, LiveTableSchema, SchemaMetadata,
};
pub use operations::{ColumnTypeMapper, SchemaOperations};
