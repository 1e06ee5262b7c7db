//! Table watchers.
//!
//! A [`TableWatcher`] observes mutations of one table. Watchers run in
//! registration order; `before_*` hooks may transform the record or abort
//! the mutation by returning an error, `after_*` hooks see the outcome.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tabula_db::record::Record;
//! use tabula_db::watchers::{TableWatcher, WatcherRegistry};
//! use tabula_core::DbResult;
//!
//! struct Uppercase;
//!
//! #[async_trait::async_trait]
//! impl TableWatcher for Uppercase {
//!     fn name(&self) -> &str { "uppercase" }
//!     fn table(&self) -> &str { "employee" }
//!
//!     async fn before_insert(&self, mut record: Record) -> DbResult<Record> {
//!         if let Some(name) = record.get("name").and_then(|v| v.as_str()) {
//!             let upper = name.to_uppercase();
//!             record.set("name", upper);
//!         }
//!         Ok(record)
//!     }
//! }
//!
//! let watchers = WatcherRegistry::new();
//! watchers.register(Arc::new(Uppercase));
//! assert_eq!(watchers.for_table("employee").len(), 1);
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use tabula_core::DbResult;

use crate::query::builder::QueryBuilder;
use crate::record::Record;

/// Hooks around the mutations of one table. Every hook defaults to a
/// pass-through.
#[async_trait::async_trait]
pub trait TableWatcher: Send + Sync {
    /// Identifies the watcher within its table.
    fn name(&self) -> &str;

    /// The table this watcher observes.
    fn table(&self) -> &str;

    async fn before_insert(&self, record: Record) -> DbResult<Record> {
        Ok(record)
    }

    async fn after_insert(&self, _record: &Record) -> DbResult<()> {
        Ok(())
    }

    async fn before_update(&self, record: Record, _query: &QueryBuilder) -> DbResult<Record> {
        Ok(record)
    }

    async fn after_update(
        &self,
        _affected: u64,
        _record: &Record,
        _query: &QueryBuilder,
    ) -> DbResult<()> {
        Ok(())
    }

    async fn before_delete(&self, _records: &[Record], _query: &QueryBuilder) -> DbResult<()> {
        Ok(())
    }

    async fn after_delete(
        &self,
        _affected: u64,
        _records: &[Record],
        _query: &QueryBuilder,
    ) -> DbResult<()> {
        Ok(())
    }
}

/// The registered watchers, shared by every [`Db`](crate::db::Db) context.
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: RwLock<Vec<Arc<dyn TableWatcher>>>,
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("watchers", &self.len())
            .finish()
    }
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watcher. A watcher with the same table and name is
    /// replaced in place.
    pub fn register(&self, watcher: Arc<dyn TableWatcher>) {
        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = watchers
            .iter_mut()
            .find(|w| w.table() == watcher.table() && w.name() == watcher.name())
        {
            *entry = watcher;
        } else {
            watchers.push(watcher);
        }
    }

    /// Removes a watcher. Returns `true` if one was found.
    pub fn unregister(&self, table: &str, name: &str) -> bool {
        let mut watchers = self.watchers.write().unwrap_or_else(PoisonError::into_inner);
        let len_before = watchers.len();
        watchers.retain(|w| !(w.table() == table && w.name() == name));
        watchers.len() < len_before
    }

    /// The watchers of `table`, in registration order.
    pub fn for_table(&self, table: &str) -> Vec<Arc<dyn TableWatcher>> {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.table() == table)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
