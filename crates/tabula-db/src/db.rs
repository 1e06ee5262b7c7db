//! Record orchestration.
//!
//! [`Db`] turns records into rows and back, fills default and update
//! values, runs watcher and column hooks, cascades deletes and carries the
//! transaction context. It is built once at the composition root from a
//! driver and the two registries, and cloned freely: clones share the
//! driver and registries.
//!
//! # Delete protocol
//!
//! A delete first reads the matching rows and then deletes exactly those
//! ids, so hooks, cascades and the reported count all agree on the rows
//! that were removed. Effects run in this order:
//!
//! 1. column `before_delete` hooks (column-scoped cascades)
//! 2. watcher `before_delete` hooks
//! 3. the physical delete
//! 4. deletes in every table listed by
//!    [`TableRegistry::cascade_delete_references`]
//! 5. watcher `after_delete` hooks
//!
//! Every row is claimed once per top-level delete. A cascade that reaches
//! a row already being deleted higher up the chain skips it, so
//! self-references and reference cycles terminate.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tabula_core::logging::statement_span;
use tabula_core::{DbError, DbResult};
use tracing::{debug, error, info, warn, Instrument};

use crate::driver::DbDriver;
use crate::query::builder::{Condition, QueryBuilder};
use crate::query::statement::{Statement, StatementConfig, StatementFactory};
use crate::record::{Query, Record, SerializedRecord, ID_FIELD};
use crate::registry::TableRegistry;
use crate::table::Table;
use crate::transactions::DbTransaction;
use crate::value::Value;
use crate::watchers::WatcherRegistry;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `(table, id)` pairs claimed by the delete in progress.
type DeleteScope = Arc<Mutex<HashSet<(String, String)>>>;

/// The record-level entry point.
///
/// # Examples
///
/// ```ignore
/// let db = Db::new(driver, Arc::new(tables), Arc::new(WatcherRegistry::new()));
///
/// let veronica = db.insert("employee", Record::new().with("name", "Veronica")).await?;
/// let bakers = db.query("employee", Query::field("department", "Cake Factory")).await?;
///
/// db.run_transaction(|tx| async move {
///     tx.insert("employee", Record::new().with("name", "Jughead")).await?;
///     Ok(())
/// })
/// .await?;
/// ```
#[derive(Clone)]
pub struct Db {
    driver: Arc<dyn DbDriver>,
    tables: Arc<TableRegistry>,
    watchers: Arc<WatcherRegistry>,
    transaction: Option<Arc<dyn DbTransaction>>,
    deleting: Option<DeleteScope>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("db_name", &self.driver.db_name())
            .field("tables", &self.tables.len())
            .field("watchers", &self.watchers.len())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl Db {
    pub fn new(
        driver: Arc<dyn DbDriver>,
        tables: Arc<TableRegistry>,
        watchers: Arc<WatcherRegistry>,
    ) -> Self {
        Self {
            driver,
            tables,
            watchers,
            transaction: None,
            deleting: None,
        }
    }

    pub fn driver(&self) -> &Arc<dyn DbDriver> {
        &self.driver
    }

    pub fn tables(&self) -> &Arc<TableRegistry> {
        &self.tables
    }

    pub fn watchers(&self) -> &Arc<WatcherRegistry> {
        &self.watchers
    }

    /// Whether statements of this context run inside a transaction.
    pub const fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn table(&self, name: &str) -> DbResult<Arc<Table>> {
        self.tables.get(name)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Inserts a record and returns it as persisted, including generated
    /// defaults and any watcher transformations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] for an unknown table or field, a
    /// value its column rejects, or a missing non-nullable field.
    pub async fn insert(&self, table: &str, record: Record) -> DbResult<Record> {
        self.insert_record(table, record)
            .instrument(statement_span(table, "insert"))
            .await
    }

    async fn insert_record(&self, name: &str, mut record: Record) -> DbResult<Record> {
        let table = self.table(name)?;
        apply_defaults(&table, &mut record);

        let watchers = self.watchers.for_table(name);
        for watcher in &watchers {
            record = watcher.before_insert(record).await?;
        }

        let row = serialize(&table, &record)?;
        for (field, column) in table.columns() {
            if !column.options().nullable && row.get(column.name()).map_or(true, Value::is_null) {
                return Err(DbError::validation(format!(
                    "Field '{field}' of table '{name}' is required"
                )));
            }
        }
        self.execute(|factory| factory.insert(name, &row)).await?;

        for watcher in &watchers {
            watcher.after_insert(&record).await?;
        }
        Ok(record)
    }

    /// Updates the rows matching `query`, or the row with the record's id
    /// when no query is given. Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Validation`] when neither a query nor an id is
    /// available, or when serialization fails.
    pub async fn update(
        &self,
        table: &str,
        record: Record,
        query: Option<Query>,
    ) -> DbResult<u64> {
        self.update_record(table, record, query)
            .instrument(statement_span(table, "update"))
            .await
    }

    async fn update_record(
        &self,
        name: &str,
        mut record: Record,
        query: Option<Query>,
    ) -> DbResult<u64> {
        let table = self.table(name)?;
        let query = match (query, record.id()) {
            (Some(query), _) => query,
            (None, Some(id)) => Query::field(ID_FIELD, id),
            (None, None) => {
                return Err(DbError::validation(format!(
                    "Updating '{name}' requires a query or a record with an id"
                )));
            }
        };
        for (field, column) in table.columns() {
            if let Some(value) = column.update_value(&record) {
                record.set(field, value);
            }
        }
        let mut query = query.into_builder(name)?;
        scope_query(&table, &mut query)?;

        let watchers = self.watchers.for_table(name);
        for watcher in &watchers {
            record = watcher.before_update(record, &query).await?;
        }

        let mut values = record.clone();
        values.remove(ID_FIELD);
        let row = serialize(&table, &values)?;
        let affected = self.execute(|factory| factory.update(&row, &query)).await?;

        for watcher in &watchers {
            watcher.after_update(affected, &record, &query).await?;
        }
        Ok(affected)
    }

    /// Deletes the rows matching `query` and everything that cascades from
    /// them. Returns the number of rows deleted from `table` itself.
    pub async fn delete(&self, table: &str, query: impl Into<Query>) -> DbResult<u64> {
        if self.deleting.is_some() {
            return self.delete_query(table, query.into()).await;
        }
        let scoped = Self {
            deleting: Some(DeleteScope::default()),
            ..self.clone()
        };
        scoped.delete_query(table, query.into()).await
    }

    fn delete_query<'a>(&'a self, table: &'a str, query: Query) -> BoxFuture<'a, DbResult<u64>> {
        Box::pin(
            self.delete_records(table, query)
                .instrument(statement_span(table, "delete")),
        )
    }

    async fn delete_records(&self, name: &str, query: Query) -> DbResult<u64> {
        let table = self.table(name)?;
        let mut query = query.into_builder(name)?;
        scope_query(&table, &mut query)?;

        let records = self.claim(name, self.select_records(&table, &query).await?);
        if records.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Value> = records
            .iter()
            .filter_map(Record::id)
            .map(Value::from)
            .collect();

        for (field, column) in table.columns() {
            column.before_delete(field, &records, self).await?;
        }
        let watchers = self.watchers.for_table(name);
        for watcher in &watchers {
            watcher.before_delete(&records, &query).await?;
        }

        let affected = if table
            .source_record_options()
            .do_not_delete_source_records_from_db
        {
            records.len() as u64
        } else if table.has_column(ID_FIELD) {
            let mut by_id = QueryBuilder::new(name);
            by_id.condition(Condition::is_in(ID_FIELD, ids.clone()))?;
            self.execute(|factory| factory.delete(&by_id)).await?
        } else {
            self.execute(|factory| factory.delete(&query)).await?
        };

        if !ids.is_empty() {
            for reference in self.tables.cascade_delete_references(&table) {
                let mut holders = QueryBuilder::new(&reference.table);
                holders.condition(Condition::is_in(
                    reference.reference_column.as_str(),
                    ids.clone(),
                ))?;
                let cascaded = self.delete_query(&reference.table, holders.into()).await?;
                debug!(
                    table = %reference.table,
                    column = %reference.reference_column,
                    cascaded,
                    "cascade delete"
                );
            }
        }

        for watcher in &watchers {
            watcher.after_delete(affected, &records, &query).await?;
        }
        Ok(affected)
    }

    /// Drops records already claimed by an enclosing delete and claims the
    /// rest.
    fn claim(&self, table: &str, records: Vec<Record>) -> Vec<Record> {
        let Some(deleting) = &self.deleting else {
            return records;
        };
        let mut deleting = deleting.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .into_iter()
            .filter(|record| match record.id() {
                Some(id) => deleting.insert((table.to_string(), id.to_string())),
                None => true,
            })
            .collect()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Returns the records matching `query`.
    pub async fn query(&self, table: &str, query: impl Into<Query>) -> DbResult<Vec<Record>> {
        let query = query.into().into_builder(table)?;
        self.query_builder(table, query).await
    }

    /// Returns the records matching a query AST.
    pub async fn query_builder(&self, table: &str, mut query: QueryBuilder) -> DbResult<Vec<Record>> {
        let span = statement_span(table, "query");
        async {
            let table = self.table(table)?;
            scope_query(&table, &mut query)?;
            self.select_records(&table, &query).await
        }
        .instrument(span)
        .await
    }

    /// Returns the first record matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::DoesNotExist`] when nothing matches.
    pub async fn get(&self, table: &str, query: impl Into<Query>) -> DbResult<Record> {
        self.query(table, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::DoesNotExist(format!("No '{table}' record matches the query")))
    }

    /// Counts the records matching `query`.
    pub async fn get_row_count(&self, table: &str, query: impl Into<Query>) -> DbResult<u64> {
        let mut query = query.into().into_builder(table)?;
        let span = statement_span(table, "count");
        async {
            let definition = self.table(table)?;
            scope_query(&definition, &mut query)?;
            let rows = self.fetch(|factory| factory.count(&query)).await?;
            let count = rows
                .into_iter()
                .next()
                .and_then(|row| row.get("count").and_then(Value::as_int))
                .unwrap_or(0);
            Ok(u64::try_from(count).unwrap_or(0))
        }
        .instrument(span)
        .await
    }

    // ── Transactions ─────────────────────────────────────────────────

    /// Runs `f` inside a new transaction.
    ///
    /// `f` receives a transactional copy of this context; every statement
    /// issued through it goes to the transaction. The transaction commits
    /// when `f` returns `Ok` and rolls back when it returns `Err`, in which
    /// case the error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Transaction`] when this context is already inside
    /// a transaction.
    pub async fn run_transaction<F, Fut, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        if self.transaction.is_some() {
            return Err(DbError::Transaction(
                "A transaction is already active in this context".to_string(),
            ));
        }
        let transaction = self.driver.begin_transaction().await?;
        let context = Self {
            transaction: Some(Arc::clone(&transaction)),
            ..self.clone()
        };

        match f(context).await {
            Ok(value) => {
                transaction.commit().await?;
                info!(db = self.driver.db_name(), "transaction committed");
                Ok(value)
            }
            Err(e) => {
                warn!(db = self.driver.db_name(), error = %e, "rolling back transaction");
                if let Err(rollback_error) = transaction.rollback().await {
                    error!(error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // ── Execution ────────────────────────────────────────────────────

    async fn select_records(&self, table: &Table, query: &QueryBuilder) -> DbResult<Vec<Record>> {
        self.fetch(|factory| factory.select(query))
            .await?
            .into_iter()
            .map(|row| deserialize(table, row))
            .collect()
    }

    /// Installs the registry's field resolver unless the driver brought
    /// its own.
    fn bind_config(&self, config: &StatementConfig) -> StatementConfig {
        if config.has_field_resolver() {
            return config.clone();
        }
        let tables = Arc::clone(&self.tables);
        config
            .clone()
            .with_field_resolver(Arc::new(move |table: &str, field: &str| {
                tables.physical_name(table, field)
            }))
    }

    async fn fetch<F>(&self, build: F) -> DbResult<Vec<SerializedRecord>>
    where
        F: Fn(StatementFactory<'_>) -> DbResult<Statement> + Send + Sync,
    {
        let last = Mutex::new(None);
        let generator = |config: &StatementConfig| self.generate(config, &build, &last);
        let result = match &self.transaction {
            Some(transaction) => transaction.run_query(&generator).await,
            None => self.driver.run_query(&generator).await,
        };
        result.map_err(|e| report(&last, e))
    }

    async fn execute<F>(&self, build: F) -> DbResult<u64>
    where
        F: Fn(StatementFactory<'_>) -> DbResult<Statement> + Send + Sync,
    {
        let last = Mutex::new(None);
        let generator = |config: &StatementConfig| self.generate(config, &build, &last);
        let result = match &self.transaction {
            Some(transaction) => transaction.run_dml(&generator).await,
            None => self.driver.run_dml(&generator).await,
        };
        result.map_err(|e| report(&last, e))
    }

    fn generate<F>(
        &self,
        config: &StatementConfig,
        build: &F,
        last: &Mutex<Option<Statement>>,
    ) -> DbResult<Statement>
    where
        F: Fn(StatementFactory<'_>) -> DbResult<Statement>,
    {
        let config = self.bind_config(config);
        let statement = build(StatementFactory::new(&config))?;
        debug!(
            sql = %statement.sql,
            params = statement.param_count(),
            in_transaction = self.in_transaction(),
            "statement"
        );
        *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(statement.clone());
        Ok(statement)
    }
}

/// Logs a failed statement with its parameters; the error is returned
/// unchanged.
fn report(last: &Mutex<Option<Statement>>, err: DbError) -> DbError {
    let last = last.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(statement) = last.as_ref() {
        error!(
            sql = %statement.sql,
            params = ?statement.params,
            named_params = ?statement.named_params,
            error = %err,
            "statement failed"
        );
    }
    err
}

/// Fills absent fields from their columns' defaults, record columns first
/// so custom defaults can see the generated id.
fn apply_defaults(table: &Table, record: &mut Record) {
    let builtin = table.columns().filter(|(_, column)| column.is_builtin());
    let custom = table.columns().filter(|(_, column)| !column.is_builtin());
    for (field, column) in builtin.chain(custom) {
        let present = record.get(field).is_some_and(|value| !value.is_null());
        if present && !column.options().force_default_value {
            continue;
        }
        if let Some(value) = column.default_value(record) {
            record.set(field, value);
        }
    }
}

fn scope_query(table: &Table, query: &mut QueryBuilder) -> DbResult<()> {
    for (_, column) in table.columns() {
        column.add_to_query(query)?;
    }
    Ok(())
}

/// Converts a record into a row keyed by physical column.
fn serialize(table: &Table, record: &Record) -> DbResult<SerializedRecord> {
    let mut row = SerializedRecord::new();
    for (field, value) in record.iter() {
        let column = table.column(field).ok_or_else(|| {
            DbError::validation(format!(
                "Unknown field '{field}' for table '{}'",
                table.name()
            ))
        })?;
        let value = column.serialize(value.clone())?;
        if value.is_null() && !column.options().nullable {
            return Err(DbError::validation(format!(
                "Field '{field}' of table '{}' cannot be null",
                table.name()
            )));
        }
        row.insert(column.name().to_string(), value);
    }
    Ok(row)
}

/// Converts a driver row back into a record keyed by logical field.
/// Columns the table does not declare (aggregates, counts) pass through.
fn deserialize(table: &Table, row: SerializedRecord) -> DbResult<Record> {
    let mut record = Record::new();
    for (name, value) in row {
        match table.field_for_column(&name) {
            Some(field) => {
                let value = match table.column(field) {
                    Some(column) if !value.is_null() => column.deserialize(value)?,
                    _ => value,
                };
                record.set(field, value);
            }
            None => record.set(name, value),
        }
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{ConfigureColumn, IntegerColumn, StringColumn};
    use crate::driver::StatementGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records generated statements and answers selects with canned rows.
    #[derive(Default)]
    struct RecordingDriver {
        statements: Mutex<Vec<Statement>>,
        rows: Mutex<Vec<SerializedRecord>>,
        transactions: AtomicUsize,
    }

    impl RecordingDriver {
        fn sql(&self) -> Vec<String> {
            self.statements
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.sql.clone())
                .collect()
        }

        fn statements(&self) -> Vec<Statement> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DbDriver for RecordingDriver {
        fn db_name(&self) -> &str {
            "recording"
        }

        async fn create_db_if_not_exists(&self) -> DbResult<()> {
            Ok(())
        }

        fn statement_config(&self) -> StatementConfig {
            StatementConfig::new()
        }

        async fn run_query(
            &self,
            generator: StatementGenerator<'_>,
        ) -> DbResult<Vec<SerializedRecord>> {
            let statement = generator(&self.statement_config())?;
            self.statements.lock().unwrap().push(statement);
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn run_dml(&self, generator: StatementGenerator<'_>) -> DbResult<u64> {
            let statement = generator(&self.statement_config())?;
            self.statements.lock().unwrap().push(statement);
            Ok(1)
        }

        async fn begin_transaction(&self) -> DbResult<Arc<dyn DbTransaction>> {
            self.transactions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopTransaction))
        }
    }

    struct NoopTransaction;

    #[async_trait::async_trait]
    impl DbTransaction for NoopTransaction {
        async fn run_query(
            &self,
            _generator: StatementGenerator<'_>,
        ) -> DbResult<Vec<SerializedRecord>> {
            Ok(Vec::new())
        }

        async fn run_dml(&self, _generator: StatementGenerator<'_>) -> DbResult<u64> {
            Ok(0)
        }

        async fn commit(&self) -> DbResult<()> {
            Ok(())
        }

        async fn rollback(&self) -> DbResult<()> {
            Ok(())
        }
    }

    fn setup() -> (Arc<RecordingDriver>, Db) {
        let driver = Arc::new(RecordingDriver::default());
        let tables = TableRegistry::with_tables([Table::builder("employee")
            .column("name", StringColumn::new("name").not_null())
            .column("department", StringColumn::new("dept"))
            .column(
                "badge",
                StringColumn::new("badge").with_default(|record| {
                    record.id().map(|id| Value::from(format!("badge-{id}")))
                }),
            )
            .column("age", IntegerColumn::new("age"))
            .build()
            .unwrap()]);
        let db = Db::new(
            Arc::clone(&driver) as Arc<dyn DbDriver>,
            Arc::new(tables),
            Arc::new(WatcherRegistry::new()),
        );
        (driver, db)
    }

    #[tokio::test]
    async fn test_insert_fills_record_columns_first() {
        let (driver, db) = setup();
        let record = db
            .insert("employee", Record::new().with("name", "Veronica"))
            .await
            .unwrap();
        let id = record.id().unwrap().to_string();
        assert_eq!(id.len(), 32);
        assert_eq!(record.get("badge"), Some(&Value::from(format!("badge-{id}"))));
        assert!(record.contains("created"));
        assert!(record.contains("updated"));

        let sql = driver.sql();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("INSERT INTO `employee` ("));
        assert!(sql[0].contains("`badge`"));
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_field() {
        let (driver, db) = setup();
        let err = db
            .insert(
                "employee",
                Record::new().with("name", "Veronica").with("salary", 10_i64),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("salary"));
        assert!(driver.sql().is_empty());
    }

    #[tokio::test]
    async fn test_insert_requires_non_nullable_fields() {
        let (_, db) = setup();
        let err = db.insert("employee", Record::new()).await.unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[tokio::test]
    async fn test_update_requires_query_or_id() {
        let (_, db) = setup();
        let err = db
            .update("employee", Record::new().with("name", "Betty"), None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), tabula_core::ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_update_by_id_sets_updated_and_skips_id() {
        let (driver, db) = setup();
        db.update(
            "employee",
            Record::new().with("id", "abc").with("department", "Pop's"),
            None,
        )
        .await
        .unwrap();
        let statement = &driver.statements()[0];
        assert!(statement.sql.starts_with("UPDATE `employee` SET `dept` = ?, `updated` = ?"));
        assert!(statement.sql.ends_with("WHERE `id` = ?;"));
        assert_eq!(statement.params.last(), Some(&Value::from("abc")));
        assert_eq!(statement.params.len(), 3);
    }

    #[tokio::test]
    async fn test_query_resolves_physical_columns() {
        let (driver, db) = setup();
        db.query("employee", Query::field("department", "Cake Factory"))
            .await
            .unwrap();
        assert_eq!(
            driver.sql(),
            ["SELECT * FROM `employee` WHERE `dept` = ?;"]
        );
    }

    #[tokio::test]
    async fn test_query_maps_rows_to_fields() {
        let (driver, db) = setup();
        let mut row = SerializedRecord::new();
        row.insert("dept".into(), Value::from("Cake Factory"));
        row.insert("age".into(), Value::from("31"));
        driver.rows.lock().unwrap().push(row);

        let records = db.query("employee", Query::Fields(Default::default())).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("department"), Some(&Value::from("Cake Factory")));
        assert_eq!(records[0].get("age"), Some(&Value::Int(31)));
    }

    #[tokio::test]
    async fn test_get_missing_is_does_not_exist() {
        let (_, db) = setup();
        let err = db.get("employee", Query::field("id", "nope")).await.unwrap_err();
        assert!(matches!(err, DbError::DoesNotExist(_)));
    }

    #[tokio::test]
    async fn test_delete_without_matches_issues_no_delete() {
        let (driver, db) = setup();
        let deleted = db
            .delete("employee", Query::field("department", "Nowhere"))
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        let sql = driver.sql();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("SELECT"));
    }

    #[tokio::test]
    async fn test_delete_by_exact_ids() {
        let (driver, db) = setup();
        let mut row = SerializedRecord::new();
        row.insert("id".into(), Value::from("a1"));
        driver.rows.lock().unwrap().push(row);

        let deleted = db
            .delete("employee", Query::field("department", "Cake Factory"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        let statements = driver.statements();
        assert_eq!(statements[1].sql, "DELETE FROM `employee` WHERE `id` IN (?);");
        assert_eq!(statements[1].params, vec![Value::from("a1")]);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let (_, db) = setup();
        assert!(db.query("missing", Query::field("id", "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_nested_transaction_rejected() {
        let (driver, db) = setup();
        let result = db
            .run_transaction(|tx| async move {
                assert!(tx.in_transaction());
                tx.run_transaction(|_| async { Ok(()) }).await
            })
            .await;
        assert!(matches!(result, Err(DbError::Transaction(_))));
        assert_eq!(driver.transactions.load(Ordering::SeqCst), 1);
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_transaction_routes_statements() {
        let (driver, db) = setup();
        db.run_transaction(|tx| async move {
            tx.insert("employee", Record::new().with("name", "Jughead"))
                .await
                .map(|_| ())
        })
        .await
        .unwrap();
        assert!(driver.sql().is_empty());
    }

    #[test]
    fn test_apply_defaults_respects_force() {
        let table = Table::builder("t")
            .column(
                "status",
                StringColumn::new("status")
                    .with_default(|_| Some(Value::from("new")))
                    .force_default_value(),
            )
            .column(
                "kind",
                StringColumn::new("kind").with_default(|_| Some(Value::from("plain"))),
            )
            .build()
            .unwrap();
        let mut record = Record::new().with("status", "old").with("kind", "fancy");
        apply_defaults(&table, &mut record);
        assert_eq!(record.get("status"), Some(&Value::from("new")));
        assert_eq!(record.get("kind"), Some(&Value::from("fancy")));
    }
}
