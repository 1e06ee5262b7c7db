//! Compiled statements, statement configuration and the DML factory.
//!
//! A driver hands a [`StatementConfig`] to each statement generator; the
//! generator uses a [`StatementFactory`] to turn query ASTs and DML intents
//! into an immutable [`Statement`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tabula_core::{DatabaseSettings, DbError, DbResult};

use crate::record::SerializedRecord;
use crate::value::Value;

use super::builder::QueryBuilder;
use super::compiler::{quote_identifier, QueryCompiler};
use super::params::ParamManager;

/// How parameters are spelled in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    /// `?` placeholders bound by position.
    #[default]
    Positional,
    /// `@name` placeholders bound by name.
    Named,
}

/// How a non-empty `IN` list is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArraySyntax {
    /// One placeholder per element: `(?, ?)` or `(@param0, @param1)`.
    #[default]
    Tuple,
    /// A single array parameter: `UNNEST(@param0)`.
    Unnest,
}

/// A compiled statement: SQL text plus its parameters.
///
/// Exactly one of `params` (positional style) or `named_params` (named
/// style) is populated. `param_types` maps each parameter (its position as
/// a string, or its name) to the SQL type resolved for it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub named_params: BTreeMap<String, Value>,
    pub param_types: BTreeMap<String, String>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub(crate) fn from_params(sql: String, params: ParamManager) -> Self {
        let (params, named_params, param_types) = params.into_parts();
        Self {
            sql,
            params,
            named_params,
            param_types,
        }
    }

    /// Total number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.params.len() + self.named_params.len()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Maps `(table, logical field)` to a physical column name.
pub type FieldResolver = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Resolves the driver-native SQL type of a parameter bound against
/// `(table, field)`. `field` is the logical field inside WHERE clauses and
/// the physical column inside INSERT and UPDATE assignments.
pub type ColumnTypeResolver = Arc<dyn Fn(&str, &str) -> DbResult<String> + Send + Sync>;

/// Rewrites a quoted column expression and its comparison value, e.g. to
/// compare case-insensitively.
pub type CaseHandler = Arc<dyn Fn(String, Value) -> (String, Value) + Send + Sync>;

/// Everything a statement generator needs to know about the target driver.
#[derive(Clone, Default)]
pub struct StatementConfig {
    /// When set, table names are qualified as `` `db`.`table` ``.
    pub db_name: Option<String>,
    pub param_style: ParamStyle,
    pub array_syntax: ArraySyntax,
    field_resolver: Option<FieldResolver>,
    column_type_resolver: Option<ColumnTypeResolver>,
    case_handler: Option<CaseHandler>,
}

impl fmt::Debug for StatementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementConfig")
            .field("db_name", &self.db_name)
            .field("param_style", &self.param_style)
            .field("array_syntax", &self.array_syntax)
            .field("field_resolver", &self.field_resolver.is_some())
            .field("column_type_resolver", &self.column_type_resolver.is_some())
            .field("case_handler", &self.case_handler.is_some())
            .finish()
    }
}

impl StatementConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a configuration from the database settings section.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            db_name: settings
                .prefix_table_names
                .then(|| settings.name.clone()),
            param_style: if settings.named_parameters {
                ParamStyle::Named
            } else {
                ParamStyle::Positional
            },
            ..Self::default()
        }
    }

    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    pub fn with_param_style(mut self, style: ParamStyle) -> Self {
        self.param_style = style;
        self
    }

    pub fn with_array_syntax(mut self, syntax: ArraySyntax) -> Self {
        self.array_syntax = syntax;
        self
    }

    pub fn with_field_resolver(mut self, resolver: FieldResolver) -> Self {
        self.field_resolver = Some(resolver);
        self
    }

    pub fn with_column_type_resolver(mut self, resolver: ColumnTypeResolver) -> Self {
        self.column_type_resolver = Some(resolver);
        self
    }

    pub fn with_case_handler(mut self, handler: CaseHandler) -> Self {
        self.case_handler = Some(handler);
        self
    }

    /// Installs a handler comparing string values case-insensitively via
    /// `LOWER(column)` and a lower-cased value.
    pub fn case_insensitive(self) -> Self {
        self.with_case_handler(Arc::new(|column: String, value: Value| match value {
            Value::String(s) => (format!("LOWER({column})"), Value::String(s.to_lowercase())),
            other => (column, other),
        }))
    }

    pub fn has_field_resolver(&self) -> bool {
        self.field_resolver.is_some()
    }

    /// The physical column name for a logical field.
    pub fn resolve_field(&self, table: &str, field: &str) -> String {
        self.field_resolver
            .as_ref()
            .map_or_else(|| field.to_string(), |resolve| resolve(table, field))
    }

    /// The SQL type of a parameter bound against `table.field`.
    ///
    /// Falls back to [`Value::inferred_sql_type`] when no resolver is
    /// installed or the resolver fails.
    pub fn resolve_type(&self, table: &str, field: &str, value: &Value) -> String {
        match &self.column_type_resolver {
            Some(resolve) => match resolve(table, field) {
                Ok(sql_type) => sql_type,
                Err(e) => {
                    tracing::trace!(table, field, error = %e, "column type lookup failed, inferring");
                    value.inferred_sql_type()
                }
            },
            None => value.inferred_sql_type(),
        }
    }

    /// Applies the case-sensitivity handler, if any.
    pub fn apply_case(&self, column: String, value: Value) -> (String, Value) {
        match &self.case_handler {
            Some(handler) => handler(column, value),
            None => (column, value),
        }
    }

    /// The quoted, optionally database-qualified table reference.
    pub fn table_ref(&self, table: &str) -> String {
        match &self.db_name {
            Some(db) => format!("{}.{}", quote_identifier(db), quote_identifier(table)),
            None => quote_identifier(table),
        }
    }
}

/// Builds statements for every kind of record operation.
///
/// # Examples
///
/// ```
/// use tabula_db::query::builder::{Condition, QueryBuilder};
/// use tabula_db::query::statement::{StatementConfig, StatementFactory};
///
/// let config = StatementConfig::new();
/// let mut qb = QueryBuilder::new("employee");
/// qb.condition(Condition::eq("department", "Cake Factory")).unwrap();
///
/// let statement = StatementFactory::new(&config).select(&qb).unwrap();
/// assert_eq!(statement.sql, "SELECT * FROM `employee` WHERE `department` = ?;");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StatementFactory<'a> {
    config: &'a StatementConfig,
}

impl<'a> StatementFactory<'a> {
    pub const fn new(config: &'a StatementConfig) -> Self {
        Self { config }
    }

    /// `SELECT ... ;` for a query AST.
    pub fn select(&self, query: &QueryBuilder) -> DbResult<Statement> {
        QueryCompiler::new(self.config).to_sql(query)
    }

    /// `SELECT COUNT(*) AS `count` FROM ... WHERE ...;`
    pub fn count(&self, query: &QueryBuilder) -> DbResult<Statement> {
        let compiler = QueryCompiler::new(self.config);
        let mut params = ParamManager::new(self.config.param_style);
        let where_clause = compiler.to_where_clause(query, &mut params)?;
        let mut sql = format!(
            "SELECT COUNT(*) AS `count` FROM {}",
            self.config.table_ref(query.table())
        );
        push_where(&mut sql, &where_clause);
        sql.push(';');
        Ok(Statement::from_params(sql, params))
    }

    /// `INSERT INTO t (cols) VALUES (...);` for one serialized row.
    pub fn insert(&self, table: &str, row: &SerializedRecord) -> DbResult<Statement> {
        if row.is_empty() {
            return Err(DbError::validation(format!(
                "Cannot insert an empty row into '{table}'"
            )));
        }
        let mut params = ParamManager::new(self.config.param_style);
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        for (column, value) in row {
            columns.push(quote_identifier(column));
            let sql_type = self.config.resolve_type(table, column, value);
            placeholders.push(params.add(value.clone(), sql_type));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.config.table_ref(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement::from_params(sql, params))
    }

    /// `UPDATE t SET ... WHERE ...;`
    ///
    /// The SET parameters precede the WHERE parameters, matching their order
    /// in the SQL text.
    pub fn update(&self, row: &SerializedRecord, query: &QueryBuilder) -> DbResult<Statement> {
        let table = query.table();
        if row.is_empty() {
            return Err(DbError::validation(format!(
                "Cannot update '{table}' with an empty row"
            )));
        }
        let mut params = ParamManager::new(self.config.param_style);
        let assignments: Vec<String> = row
            .iter()
            .map(|(column, value)| {
                let sql_type = self.config.resolve_type(table, column, value);
                let placeholder = params.add(value.clone(), sql_type);
                format!("{} = {placeholder}", quote_identifier(column))
            })
            .collect();
        let where_clause = QueryCompiler::new(self.config).to_where_clause(query, &mut params)?;
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.config.table_ref(table),
            assignments.join(", ")
        );
        push_where(&mut sql, &where_clause);
        sql.push(';');
        Ok(Statement::from_params(sql, params))
    }

    /// `DELETE FROM t WHERE ...;`
    pub fn delete(&self, query: &QueryBuilder) -> DbResult<Statement> {
        let mut params = ParamManager::new(self.config.param_style);
        let where_clause = QueryCompiler::new(self.config).to_where_clause(query, &mut params)?;
        let mut sql = format!("DELETE FROM {}", self.config.table_ref(query.table()));
        push_where(&mut sql, &where_clause);
        sql.push(';');
        Ok(Statement::from_params(sql, params))
    }
}

fn push_where(sql: &mut String, where_clause: &str) {
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_clause);
    }
}
