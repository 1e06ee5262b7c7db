//! Transaction handles.
//!
//! A [`DbTransaction`] is opened by [`DbDriver::begin_transaction`] and
//! carried by a transactional [`Db`](crate::db::Db) context, which routes
//! every statement through it. See [`Db::run_transaction`].
//!
//! [`DbDriver::begin_transaction`]: crate::driver::DbDriver::begin_transaction
//! [`Db::run_transaction`]: crate::db::Db::run_transaction

use tabula_core::DbResult;

use crate::driver::StatementGenerator;
use crate::record::SerializedRecord;

/// An open transaction on a driver.
///
/// `commit` and `rollback` end the transaction; statements issued after
/// either should fail with [`DbError::Transaction`](tabula_core::DbError).
#[async_trait::async_trait]
pub trait DbTransaction: Send + Sync {
    async fn run_query(&self, generator: StatementGenerator<'_>)
        -> DbResult<Vec<SerializedRecord>>;

    async fn run_dml(&self, generator: StatementGenerator<'_>) -> DbResult<u64>;

    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;
}
