//! SQLite driver using `rusqlite`.
//!
//! [`SqliteDriver`] implements [`DbDriver`] and [`SchemaDriver`] over a WAL
//! database file. Blocking `rusqlite` calls run on the blocking pool via
//! `tokio::task::spawn_blocking`.
//!
//! Each transaction opens its own connection, so writes made inside a
//! transaction stay invisible to the driver's main connection until commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tabula_core::{DatabaseSettings, DbError, DbResult};
use tabula_db::driver::{DbDriver, StatementGenerator};
use tabula_db::query::statement::{ArraySyntax, Statement, StatementConfig};
use tabula_db::record::SerializedRecord;
use tabula_db::transactions::DbTransaction;
use tabula_db::value::Value;
use tabula_db_migrations::{SchemaDriver, TableManager};
use tokio::sync::Mutex;

use crate::schema::{sqlite_type, SqliteSchema};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn driver_error(e: rusqlite::Error) -> DbError {
    DbError::Database(e.to_string())
}

fn join_error(e: tokio::task::JoinError) -> DbError {
    DbError::Database(format!("Task join error: {e}"))
}

pub(crate) fn open_connection(path: &Path) -> DbResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| DbError::Database(format!("SQLite open failed: {e}")))?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(driver_error)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| DbError::Database(format!("Failed to set pragmas: {e}")))?;
    Ok(conn)
}

/// Runs `f` against a shared connection on the blocking pool.
pub(crate) async fn with_connection<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let conn = conn.blocking_lock();
        f(&conn)
    })
    .await
    .map_err(join_error)?
}

fn bind_value(stmt: &mut rusqlite::Statement<'_>, idx: usize, value: &Value) -> DbResult<()> {
    match value {
        Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
        Value::Bool(b) => stmt.raw_bind_parameter(idx, i64::from(*b)),
        Value::Int(v) => stmt.raw_bind_parameter(idx, v),
        Value::Float(v) => stmt.raw_bind_parameter(idx, v),
        Value::Decimal(s) | Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
        Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
        Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
        Value::DateTime(dt) => {
            stmt.raw_bind_parameter(idx, dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
        Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
        Value::Json(_) | Value::List(_) => {
            stmt.raw_bind_parameter(idx, value.to_json().to_string())
        }
    }
    .map_err(|e| DbError::Database(format!("Bind error: {e}")))
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, statement: &Statement) -> DbResult<()> {
    for (i, value) in statement.params.iter().enumerate() {
        bind_value(stmt, i + 1, value)?;
    }
    for (name, value) in &statement.named_params {
        let placeholder = format!("@{name}");
        let idx = stmt
            .parameter_index(&placeholder)
            .map_err(driver_error)?
            .ok_or_else(|| DbError::Database(format!("Unknown parameter {placeholder}")))?;
        bind_value(stmt, idx, value)?;
    }
    Ok(())
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

pub(crate) fn query_rows(
    conn: &Connection,
    statement: &Statement,
) -> DbResult<Vec<SerializedRecord>> {
    let mut stmt = conn.prepare(&statement.sql).map_err(driver_error)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    bind_params(&mut stmt, statement)?;

    let mut raw_rows = stmt.raw_query();
    let mut rows = Vec::new();
    while let Some(row) = raw_rows.next().map_err(driver_error)? {
        let mut record = SerializedRecord::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = row.get_ref(i).map_err(driver_error)?;
            record.insert(name.clone(), read_value(value));
        }
        rows.push(record);
    }
    Ok(rows)
}

pub(crate) fn execute(conn: &Connection, statement: &Statement) -> DbResult<u64> {
    let mut stmt = conn.prepare(&statement.sql).map_err(driver_error)?;
    bind_params(&mut stmt, statement)?;
    let count = stmt.raw_execute().map_err(driver_error)?;
    Ok(count as u64)
}

/// A SQLite-backed [`DbDriver`].
pub struct SqliteDriver {
    name: String,
    path: PathBuf,
    /// Whether the database file was created by this driver and should be
    /// removed on drop.
    owns_file: bool,
    settings: DatabaseSettings,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteDriver {
    /// Opens the database described by `settings`.
    ///
    /// Without a configured path the database lives in a fresh file under
    /// the system temp directory, removed again when the driver is dropped.
    pub fn open(settings: &DatabaseSettings) -> DbResult<Self> {
        let (path, owns_file) = match &settings.path {
            Some(path) => (path.clone(), false),
            None => (
                std::env::temp_dir().join(format!("tabula-{}.db", uuid::Uuid::new_v4().simple())),
                true,
            ),
        };
        let conn = open_connection(&path)?;
        tracing::debug!(path = %path.display(), "opened SQLite database");
        Ok(Self {
            name: settings.name.clone(),
            path,
            owns_file,
            settings: settings.clone(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A throwaway database with default settings.
    pub fn temporary() -> DbResult<Self> {
        Self::open(&DatabaseSettings::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Introspection and DDL over this driver's connection.
    pub fn schema(&self) -> SqliteSchema {
        SqliteSchema::new(Arc::clone(&self.conn))
    }

    /// Runs raw SQL without parameters, for test setup.
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        with_connection(&self.conn, move |conn| {
            conn.execute_batch(&sql).map_err(driver_error)
        })
        .await
    }

    fn generate(&self, generator: StatementGenerator<'_>) -> DbResult<Statement> {
        generator(&self.statement_config())
    }
}

impl Drop for SqliteDriver {
    fn drop(&mut self) {
        if !self.owns_file {
            return;
        }
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            // The file may never have been created.
            let _ = std::fs::remove_file(file);
        }
    }
}

#[async_trait::async_trait]
impl DbDriver for SqliteDriver {
    fn db_name(&self) -> &str {
        &self.name
    }

    async fn create_db_if_not_exists(&self) -> DbResult<()> {
        // Opening the file created it.
        Ok(())
    }

    fn statement_config(&self) -> StatementConfig {
        // SQLite has no array parameters.
        StatementConfig::from_settings(&self.settings).with_array_syntax(ArraySyntax::Tuple)
    }

    async fn run_query(
        &self,
        generator: StatementGenerator<'_>,
    ) -> DbResult<Vec<SerializedRecord>> {
        let statement = self.generate(generator)?;
        with_connection(&self.conn, move |conn| query_rows(conn, &statement)).await
    }

    async fn run_dml(&self, generator: StatementGenerator<'_>) -> DbResult<u64> {
        let statement = self.generate(generator)?;
        with_connection(&self.conn, move |conn| execute(conn, &statement)).await
    }

    async fn begin_transaction(&self) -> DbResult<Arc<dyn DbTransaction>> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path)?;
            conn.execute_batch("BEGIN").map_err(|e| DbError::Transaction(e.to_string()))?;
            Ok::<_, DbError>(conn)
        })
        .await
        .map_err(join_error)??;
        Ok(Arc::new(SqliteTransaction {
            config: self.statement_config(),
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

impl SchemaDriver for SqliteDriver {
    fn table_manager(&self) -> TableManager {
        let schema = Arc::new(self.schema());
        TableManager::new(schema.clone(), schema, Arc::new(sqlite_type))
    }
}

/// A transaction on its own connection.
pub struct SqliteTransaction {
    config: StatementConfig,
    /// `None` once committed or rolled back.
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteTransaction {
    async fn with_open<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            let conn = guard
                .as_ref()
                .ok_or_else(|| DbError::Transaction("Transaction already finished".to_string()))?;
            f(conn)
        })
        .await
        .map_err(join_error)?
    }

    async fn finish(&self, sql: &'static str) -> DbResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .blocking_lock()
                .take()
                .ok_or_else(|| DbError::Transaction("Transaction already finished".to_string()))?;
            conn.execute_batch(sql)
                .map_err(|e| DbError::Transaction(e.to_string()))
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait::async_trait]
impl DbTransaction for SqliteTransaction {
    async fn run_query(
        &self,
        generator: StatementGenerator<'_>,
    ) -> DbResult<Vec<SerializedRecord>> {
        let statement = generator(&self.config)?;
        self.with_open(move |conn| query_rows(conn, &statement)).await
    }

    async fn run_dml(&self, generator: StatementGenerator<'_>) -> DbResult<u64> {
        let statement = generator(&self.config)?;
        self.with_open(move |conn| execute(conn, &statement)).await
    }

    async fn commit(&self) -> DbResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.finish("ROLLBACK").await
    }
}
