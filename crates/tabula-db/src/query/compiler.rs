//! Compiles a [`QueryBuilder`] into parameterized SQL.
//!
//! The WHERE clause is compiled depth-first from the root's children:
//! root-level predicates are joined with `AND`, logical nodes are wrapped in
//! parentheses and joined with their own operator. The WHERE clause is always
//! compiled before any other clause so the parameter order matches the order
//! placeholders appear in the final SQL text; no other clause consumes
//! parameters.
//!
//! Identifiers are quoted with backticks. Conditions follow these rules:
//!
//! | condition | SQL |
//! |---|---|
//! | `x = NULL` | `` `x` IS NULL `` |
//! | `x <> NULL`, `x != NULL` | `` `x` IS NOT NULL `` |
//! | `x IN []`, `x IN` with no value | `1=0` |
//! | `x IN [a, b]` (positional) | `` `x` IN (?, ?) `` |
//! | `x IN [a, b]` (named) | `` `x` IN (@param0, @param1) `` |
//! | `x IN [a, b]` ([`ArraySyntax::Unnest`]) | `` `x` IN UNNEST(@param0) `` |
//! | `x BETWEEN [a, b]` | `` `x` BETWEEN ? AND ? `` |
//! | `x IN <query>` | `` `x` IN (SELECT ...) `` |

use tabula_core::{DbError, DbResult};

use crate::value::Value;

use super::builder::{
    Aggregate, Condition, ConditionValue, Node, NodeId, Operator, QueryBuilder, SortCriteria,
    SortDirection, ROOT,
};
use super::params::ParamManager;
use super::statement::{ArraySyntax, Statement, StatementConfig};

/// The predicate emitted for membership tests against an empty set.
pub const ALWAYS_FALSE: &str = "1=0";

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Compiles query ASTs against one [`StatementConfig`].
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    config: &'a StatementConfig,
}

impl<'a> QueryCompiler<'a> {
    pub const fn new(config: &'a StatementConfig) -> Self {
        Self { config }
    }

    /// Compiles a full `SELECT` statement, terminated by `;`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidQuery`] for malformed conditions.
    pub fn to_sql(&self, query: &QueryBuilder) -> DbResult<Statement> {
        let mut params = ParamManager::new(self.config.param_style);
        let mut sql = self.to_select(query, &mut params)?;
        sql.push(';');
        Ok(Statement::from_params(sql, params))
    }

    /// Compiles a `SELECT` without the trailing `;`, collecting parameters
    /// into `params`. Subqueries are compiled through this method.
    pub fn to_select(&self, query: &QueryBuilder, params: &mut ParamManager) -> DbResult<String> {
        let where_clause = self.to_where_clause(query, params)?;
        let table = query.table();

        let mut projection = Vec::new();
        let mut group_by = Vec::new();
        let mut order_by = Vec::new();
        let mut window = None;
        for id in query.children(ROOT) {
            match query.node(*id) {
                Some(Node::Select(fields)) => {
                    projection.extend(fields.iter().map(|f| self.column(table, f)));
                }
                Some(Node::Aggregate(aggregate)) => {
                    projection.push(self.aggregate(table, aggregate));
                }
                Some(Node::GroupBy(fields)) => {
                    group_by.extend(fields.iter().map(|f| self.column(table, f)));
                }
                Some(Node::Sort(criteria)) => order_by.push(self.sort(table, criteria)),
                Some(Node::Pagination { start, end }) => window = Some((*start, *end)),
                Some(Node::Root | Node::Condition(_) | Node::Logical(_)) | None => {}
            }
        }

        let mut sql = String::from("SELECT ");
        if projection.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&projection.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.config.table_ref(table));
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        if let Some((start, end)) = window {
            sql.push_str(&format!(" LIMIT {} OFFSET {start}", end - start));
        }
        Ok(sql)
    }

    /// Compiles only the filter tree, without the `WHERE` keyword.
    ///
    /// Returns an empty string for a query without conditions.
    pub fn to_where_clause(&self, query: &QueryBuilder, params: &mut ParamManager) -> DbResult<String> {
        let parts = self.compile_children(query, ROOT, params)?;
        Ok(parts.join(" AND "))
    }

    fn compile_children(
        &self,
        query: &QueryBuilder,
        parent: NodeId,
        params: &mut ParamManager,
    ) -> DbResult<Vec<String>> {
        let mut parts = Vec::new();
        for child in query.children(parent) {
            let part = self.compile_node(query, *child, params)?;
            if !part.is_empty() {
                parts.push(part);
            }
        }
        Ok(parts)
    }

    fn compile_node(&self, query: &QueryBuilder, id: NodeId, params: &mut ParamManager) -> DbResult<String> {
        match query.node(id) {
            Some(Node::Condition(condition)) => self.compile_condition(query.table(), condition, params),
            Some(Node::Logical(operator)) => {
                let parts = self.compile_children(query, id, params)?;
                if parts.is_empty() {
                    Ok(String::new())
                } else {
                    Ok(format!("({})", parts.join(&format!(" {} ", operator.as_sql()))))
                }
            }
            Some(
                Node::Root
                | Node::Select(_)
                | Node::Aggregate(_)
                | Node::GroupBy(_)
                | Node::Sort(_)
                | Node::Pagination { .. },
            ) => Ok(String::new()),
            None => Err(DbError::invalid_query(format!("Unknown node {id}"))),
        }
    }

    fn compile_condition(
        &self,
        table: &str,
        condition: &Condition,
        params: &mut ParamManager,
    ) -> DbResult<String> {
        let column = self.column(table, &condition.field);
        let op = condition.operator;
        match (&condition.value, op) {
            (_, Operator::IsNull | Operator::IsNotNull) => Ok(format!("{column} {op}")),
            (ConditionValue::Subquery(subquery), _) => {
                let mut nested = params.subquery();
                let sql = self.to_select(subquery, &mut nested)?;
                params.merge(nested);
                Ok(format!("{column} {op} ({sql})"))
            }
            (ConditionValue::Absent, Operator::In | Operator::NotIn) => Ok(ALWAYS_FALSE.to_string()),
            (ConditionValue::Absent, _) => Err(DbError::invalid_query(format!(
                "Condition on '{}' with operator {op} requires a value",
                condition.field
            ))),
            (ConditionValue::Value(Value::Null), Operator::Eq) => Ok(format!("{column} IS NULL")),
            (ConditionValue::Value(Value::Null), Operator::Ne | Operator::NotEq) => {
                Ok(format!("{column} IS NOT NULL"))
            }
            (ConditionValue::Value(value), Operator::In | Operator::NotIn) => {
                self.compile_membership(table, condition, column, value, params)
            }
            (ConditionValue::Value(value), Operator::Between) => match value {
                Value::List(bounds) if bounds.len() == 2 => {
                    let mut placeholders = Vec::with_capacity(2);
                    let mut column = column;
                    for bound in bounds {
                        let (cased, bound) = self.config.apply_case(column.clone(), bound.clone());
                        column = cased;
                        let sql_type = self.config.resolve_type(table, &condition.field, &bound);
                        placeholders.push(params.add(bound, sql_type));
                    }
                    Ok(format!(
                        "{column} BETWEEN {} AND {}",
                        placeholders[0], placeholders[1]
                    ))
                }
                _ => Err(DbError::invalid_query(format!(
                    "BETWEEN on '{}' requires exactly two values",
                    condition.field
                ))),
            },
            (ConditionValue::Value(value), _) => {
                let (column, value) = self.config.apply_case(column, value.clone());
                let sql_type = self.config.resolve_type(table, &condition.field, &value);
                let placeholder = params.add(value, sql_type);
                Ok(format!("{column} {op} {placeholder}"))
            }
        }
    }

    fn compile_membership(
        &self,
        table: &str,
        condition: &Condition,
        column: String,
        value: &Value,
        params: &mut ParamManager,
    ) -> DbResult<String> {
        let op = condition.operator;
        let Value::List(items) = value else {
            return Err(DbError::invalid_query(format!(
                "{op} on '{}' requires a list of values",
                condition.field
            )));
        };
        if items.is_empty() {
            return Ok(ALWAYS_FALSE.to_string());
        }

        let mut cased_column = None;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let (cased, item) = self.config.apply_case(column.clone(), item.clone());
            cased_column.get_or_insert(cased);
            values.push(item);
        }
        let column = cased_column.unwrap_or(column);

        match self.config.array_syntax {
            ArraySyntax::Tuple => {
                let placeholders: Vec<String> = values
                    .into_iter()
                    .map(|item| {
                        let sql_type = self.config.resolve_type(table, &condition.field, &item);
                        params.add(item, sql_type)
                    })
                    .collect();
                Ok(format!("{column} {op} ({})", placeholders.join(", ")))
            }
            ArraySyntax::Unnest => {
                let element = values.iter().find(|v| !v.is_null()).unwrap_or(&Value::Null);
                let element_type = self.config.resolve_type(table, &condition.field, element);
                let placeholder = params.add(Value::List(values), format!("ARRAY<{element_type}>"));
                Ok(format!("{column} {op} UNNEST({placeholder})"))
            }
        }
    }

    fn column(&self, table: &str, field: &str) -> String {
        if field == "*" {
            return "*".to_string();
        }
        quote_identifier(&self.config.resolve_field(table, field))
    }

    fn aggregate(&self, table: &str, aggregate: &Aggregate) -> String {
        format!(
            "{}({}) AS {}",
            aggregate.function.as_sql(),
            self.column(table, &aggregate.field),
            quote_identifier(&aggregate.result_field)
        )
    }

    fn sort(&self, table: &str, criteria: &SortCriteria) -> String {
        let column = self.column(table, &criteria.field);
        let direction = match criteria.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        match &criteria.values {
            Some(values) => {
                let mut sql = String::from("CASE");
                for (rank, value) in values.iter().enumerate() {
                    if value.is_null() {
                        sql.push_str(&format!(" WHEN {column} IS NULL THEN {rank}"));
                    } else {
                        sql.push_str(&format!(
                            " WHEN {column} = {} THEN {rank}",
                            value.sql_literal()
                        ));
                    }
                }
                sql.push_str(&format!(" ELSE {} END {direction}", values.len()));
                sql
            }
            None => format!("{column} {direction}"),
        }
    }
}
