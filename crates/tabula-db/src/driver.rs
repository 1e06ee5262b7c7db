//! The driver contract.
//!
//! [`DbDriver`] is the bridge between the record layer and a concrete
//! backend. The record layer never hands a driver finished SQL; it hands a
//! [`StatementGenerator`] that the driver calls with its own
//! [`StatementConfig`], so dialect choices (parameter style, table
//! qualification, column types, case handling) stay with the driver.

use std::sync::Arc;

use tabula_core::DbResult;

use crate::query::statement::{Statement, StatementConfig};
use crate::record::SerializedRecord;
use crate::transactions::DbTransaction;

/// Produces a statement for a driver's configuration.
pub type StatementGenerator<'a> =
    &'a (dyn Fn(&StatementConfig) -> DbResult<Statement> + Send + Sync);

/// A backend capable of executing generated statements.
///
/// Implemented by backend crates; the SQLite driver in `tabula-test` is
/// the reference implementation.
#[async_trait::async_trait]
pub trait DbDriver: Send + Sync {
    /// The database this driver is connected to.
    fn db_name(&self) -> &str;

    /// Creates the database if it does not exist. Must be idempotent.
    async fn create_db_if_not_exists(&self) -> DbResult<()>;

    async fn start(&self) -> DbResult<()> {
        Ok(())
    }

    async fn stop(&self) -> DbResult<()> {
        Ok(())
    }

    /// The configuration handed to every statement generator.
    fn statement_config(&self) -> StatementConfig;

    /// Runs a statement returning rows keyed by physical column name.
    async fn run_query(&self, generator: StatementGenerator<'_>)
        -> DbResult<Vec<SerializedRecord>>;

    /// Runs a statement returning the number of affected rows.
    async fn run_dml(&self, generator: StatementGenerator<'_>) -> DbResult<u64>;

    /// Opens a transaction; statements routed through the returned handle
    /// are invisible to other connections until it commits.
    async fn begin_transaction(&self) -> DbResult<Arc<dyn DbTransaction>>;
}
