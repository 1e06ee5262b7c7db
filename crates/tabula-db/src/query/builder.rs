//! The query AST.
//!
//! A [`QueryBuilder`] is an arena of [`Node`]s addressed by [`NodeId`] with
//! explicit parent and child edges. Node `0` is always the root. Conditions,
//! logical groups, projections, aggregates, grouping, sorting and pagination
//! all hang off the root (conditions may also nest under logical nodes).
//!
//! Builders are built fluently and fallibly:
//!
//! ```
//! use tabula_db::query::builder::{Condition, Operator, QueryBuilder, QueryElement};
//!
//! # fn main() -> tabula_core::DbResult<()> {
//! let mut qb = QueryBuilder::new("employee");
//! qb.condition(Condition::new("department", Operator::Eq, "Cake Factory"))?
//!     .or(vec![QueryElement::from(Condition::new("age", Operator::Gt, 40_i64))])?
//!     .paginate(0, 10)?;
//! assert_eq!(qb.condition_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Conditions attached directly to the root are remembered until the next
//! [`and`](QueryBuilder::and) or [`or`](QueryBuilder::or) call, which moves
//! them under the new logical node. `qb.condition(a)?.or([b])?` therefore
//! produces `(a OR b)` rather than `a AND (b)`.
//!
//! Cloning is deep: every nested subquery is cloned too and every clone gets
//! a fresh instance id, so two queries never share a subquery.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use tabula_core::{DbError, DbResult};

use crate::value::Value;

/// Index of a node inside a builder's arena.
pub type NodeId = usize;

/// The id of the root node in every builder.
pub const ROOT: NodeId = 0;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_instance_id() -> u64 {
    INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A comparison operator usable in a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    /// `<>`
    Ne,
    /// `!=`
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// The SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator tests for null and takes no value.
    pub const fn is_null_test(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// Whether the operator takes a list of values.
    pub const fn is_set_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "<>" => Ok(Self::Ne),
            "!=" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "BETWEEN" => Ok(Self::Between),
            "IS NULL" => Ok(Self::IsNull),
            "IS NOT NULL" => Ok(Self::IsNotNull),
            other => Err(DbError::invalid_query(format!("Unknown operator '{other}'"))),
        }
    }
}

/// `AND` or `OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// The SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// The right-hand side of a condition.
#[derive(Debug, Clone)]
pub enum ConditionValue {
    /// No value supplied. Valid only for null tests and `IN`/`NOT IN`.
    Absent,
    /// A literal value, bound as a parameter.
    Value(Value),
    /// A nested query compiled inline as `(SELECT ...)`.
    Subquery(Box<QueryBuilder>),
}

/// A single `field <op> value` predicate.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    /// A condition comparing `field` against a literal value.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::Value(value.into()),
        }
    }

    /// A condition without a value (`IS NULL`, `IS NOT NULL`, or an
    /// always-false `IN`).
    pub fn without_value(field: impl Into<String>, operator: Operator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::Absent,
        }
    }

    /// A condition whose value is a subquery.
    pub fn subquery(field: impl Into<String>, operator: Operator, query: QueryBuilder) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::Subquery(Box::new(query)),
        }
    }

    /// Shorthand for `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// Shorthand for `field IN (values)`.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, Value::List(values))
    }

    fn validate(&self) -> DbResult<()> {
        match (&self.value, self.operator) {
            (_, op) if op.is_null_test() => Ok(()),
            (ConditionValue::Absent, op) if op.is_set_membership() => Ok(()),
            (ConditionValue::Absent, op) => Err(DbError::invalid_query(format!(
                "Condition on '{}' with operator {op} requires a value",
                self.field
            ))),
            (ConditionValue::Value(Value::List(items)), Operator::Between) if items.len() == 2 => {
                Ok(())
            }
            (_, Operator::Between) => Err(DbError::invalid_query(format!(
                "BETWEEN on '{}' requires exactly two values",
                self.field
            ))),
            (ConditionValue::Value(Value::List(_)), op) if op.is_set_membership() => Ok(()),
            (ConditionValue::Value(_), op) if op.is_set_membership() => Err(
                DbError::invalid_query(format!("{op} on '{}' requires a list of values", self.field)),
            ),
            (ConditionValue::Value(Value::List(_)), op) => Err(DbError::invalid_query(format!(
                "{op} on '{}' compares against a single value, not a list",
                self.field
            ))),
            _ => Ok(()),
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// The SQL function name.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// An aggregate projection, `FUNC(field) AS result_field`.
///
/// A `field` of `*` compiles to `FUNC(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub field: String,
    pub result_field: String,
}

impl Aggregate {
    pub fn new(
        function: AggregateFunction,
        field: impl Into<String>,
        result_field: impl Into<String>,
    ) -> Self {
        Self {
            function,
            field: field.into(),
            result_field: result_field.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A sort on one field, either by direction or by an explicit value ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct SortCriteria {
    pub field: String,
    pub direction: SortDirection,
    /// When set, rows are ordered by the position of their value in this
    /// list; unlisted values sort last.
    pub values: Option<Vec<Value>>,
}

impl SortCriteria {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            values: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
            values: None,
        }
    }

    /// Orders by the rank of each value in `values`.
    pub fn by_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            values: Some(values),
        }
    }
}

/// A node in the query arena.
#[derive(Debug, Clone)]
pub enum Node {
    Root,
    Condition(Condition),
    Logical(LogicalOperator),
    Select(Vec<String>),
    Aggregate(Aggregate),
    GroupBy(Vec<String>),
    Sort(SortCriteria),
    /// The half-open row window `[start, end)`.
    Pagination { start: usize, end: usize },
}

/// A nested logical group passed to [`QueryBuilder::and`] / [`QueryBuilder::or`].
#[derive(Debug, Clone)]
pub struct LogicalGroup {
    pub operator: LogicalOperator,
    pub elements: Vec<QueryElement>,
}

impl LogicalGroup {
    pub fn and(elements: Vec<QueryElement>) -> Self {
        Self {
            operator: LogicalOperator::And,
            elements,
        }
    }

    pub fn or(elements: Vec<QueryElement>) -> Self {
        Self {
            operator: LogicalOperator::Or,
            elements,
        }
    }
}

/// One element of a logical group.
#[derive(Debug, Clone)]
pub enum QueryElement {
    Condition(Condition),
    Group(LogicalGroup),
    /// A previously built query whose filter tree is grafted into the group.
    Builder(QueryBuilder),
}

impl From<Condition> for QueryElement {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<LogicalGroup> for QueryElement {
    fn from(group: LogicalGroup) -> Self {
        Self::Group(group)
    }
}

impl From<QueryBuilder> for QueryElement {
    fn from(builder: QueryBuilder) -> Self {
        Self::Builder(builder)
    }
}

/// A mutable query AST for one table.
#[derive(Debug)]
pub struct QueryBuilder {
    table: String,
    instance_id: u64,
    nodes: Vec<Node>,
    children: Vec<Vec<NodeId>>,
    parents: Vec<Option<NodeId>>,
    /// Root-level conditions not yet claimed by an `and`/`or` call.
    pending: Vec<NodeId>,
    pagination: Option<NodeId>,
}

impl Clone for QueryBuilder {
    fn clone(&self) -> Self {
        // `Node::clone` clones nested subqueries through this impl, so every
        // level gets a fresh instance id.
        Self {
            table: self.table.clone(),
            instance_id: next_instance_id(),
            nodes: self.nodes.clone(),
            children: self.children.clone(),
            parents: self.parents.clone(),
            pending: self.pending.clone(),
            pagination: self.pagination,
        }
    }
}

impl QueryBuilder {
    /// Creates an empty query against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            instance_id: next_instance_id(),
            nodes: vec![Node::Root],
            children: vec![Vec::new()],
            parents: vec![None],
            pending: Vec::new(),
            pagination: None,
        }
    }

    /// Deep-copies another builder, including nested subqueries.
    pub fn from_query_builder(other: &Self) -> Self {
        other.clone()
    }

    /// Builds a query that ANDs one equality condition per map entry.
    ///
    /// # Errors
    ///
    /// Returns a construction error if any entry produces an invalid
    /// condition.
    pub fn from_object(table: impl Into<String>, fields: &BTreeMap<String, Value>) -> DbResult<Self> {
        let mut qb = Self::new(table);
        let mut conditions: Vec<Condition> = fields
            .iter()
            .map(|(field, value)| Condition::eq(field.clone(), value.clone()))
            .collect();
        if conditions.len() == 1 {
            if let Some(condition) = conditions.pop() {
                qb.condition(condition)?;
            }
        } else if !conditions.is_empty() {
            qb.and(conditions.into_iter().map(QueryElement::from).collect())?;
        }
        Ok(qb)
    }

    /// The table this query reads from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The process-unique id of this builder instance.
    pub const fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Returns a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns the children of a node, in insertion order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Returns the parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id).copied().flatten()
    }

    /// Number of condition nodes reachable from the root.
    pub fn condition_count(&self) -> usize {
        self.descendants(ROOT)
            .into_iter()
            .filter(|id| matches!(self.nodes[*id], Node::Condition(_)))
            .count()
    }

    /// Whether the query has no filter at all.
    pub fn has_filter(&self) -> bool {
        self.children(ROOT)
            .iter()
            .any(|id| matches!(self.nodes[*id], Node::Condition(_) | Node::Logical(_)))
    }

    /// Mutable access to the subquery held by a condition node.
    pub fn subquery_mut(&mut self, id: NodeId) -> Option<&mut QueryBuilder> {
        match self.nodes.get_mut(id) {
            Some(Node::Condition(Condition {
                value: ConditionValue::Subquery(sub),
                ..
            })) => Some(sub),
            _ => None,
        }
    }

    // ── Construction ────────────────────────────────────────────────

    /// Adds a condition under the root.
    ///
    /// # Errors
    ///
    /// Returns a construction error for a missing value, a malformed
    /// multi-value operator or a self-referencing subquery.
    pub fn condition(&mut self, condition: Condition) -> DbResult<&mut Self> {
        let id = self.add_condition(ROOT, condition)?;
        self.pending.push(id);
        Ok(self)
    }

    /// Adds a condition under an existing logical node (or the root).
    ///
    /// # Errors
    ///
    /// As [`condition`](Self::condition), plus an error for an unknown or
    /// non-logical parent.
    pub fn condition_under(&mut self, parent: NodeId, condition: Condition) -> DbResult<NodeId> {
        self.check_group_parent(parent)?;
        self.add_condition(parent, condition)
    }

    /// Groups pending root conditions and `elements` under a new `AND` node.
    ///
    /// # Errors
    ///
    /// Propagates construction errors from the elements.
    pub fn and(&mut self, elements: Vec<QueryElement>) -> DbResult<&mut Self> {
        self.group_at_root(LogicalOperator::And, elements)?;
        Ok(self)
    }

    /// Groups pending root conditions and `elements` under a new `OR` node.
    ///
    /// # Errors
    ///
    /// Propagates construction errors from the elements.
    pub fn or(&mut self, elements: Vec<QueryElement>) -> DbResult<&mut Self> {
        self.group_at_root(LogicalOperator::Or, elements)?;
        Ok(self)
    }

    /// Adds a logical node under `parent` without claiming pending root
    /// conditions. Returns the new node's id.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or non-logical parent, or any
    /// construction error from the elements.
    pub fn logical_under(
        &mut self,
        parent: NodeId,
        operator: LogicalOperator,
        elements: Vec<QueryElement>,
    ) -> DbResult<NodeId> {
        self.check_group_parent(parent)?;
        let id = self.push_node(parent, Node::Logical(operator));
        for element in elements {
            self.attach(id, element)?;
        }
        Ok(id)
    }

    /// Projects the given fields instead of `*`.
    pub fn select<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> DbResult<&mut Self> {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(DbError::invalid_query("select requires at least one field"));
        }
        self.push_node(ROOT, Node::Select(fields));
        Ok(self)
    }

    /// Adds an aggregate projection.
    pub fn aggregate(&mut self, aggregate: Aggregate) -> DbResult<&mut Self> {
        self.push_node(ROOT, Node::Aggregate(aggregate));
        Ok(self)
    }

    /// Adds `GROUP BY` fields.
    pub fn group_by<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> DbResult<&mut Self> {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(DbError::invalid_query("group_by requires at least one field"));
        }
        self.push_node(ROOT, Node::GroupBy(fields));
        Ok(self)
    }

    /// Appends a sort criterion. Criteria apply in insertion order.
    pub fn sort(&mut self, criteria: SortCriteria) -> DbResult<&mut Self> {
        if matches!(&criteria.values, Some(values) if values.is_empty()) {
            return Err(DbError::invalid_query(format!(
                "Sort on '{}' by values requires at least one value",
                criteria.field
            )));
        }
        self.push_node(ROOT, Node::Sort(criteria));
        Ok(self)
    }

    /// Restricts results to the row window `[start, end)`.
    ///
    /// Calling this again replaces the previous window.
    ///
    /// # Errors
    ///
    /// Returns a construction error when `end < start`.
    pub fn paginate(&mut self, start: usize, end: usize) -> DbResult<&mut Self> {
        if end < start {
            return Err(DbError::invalid_query(format!(
                "Invalid pagination window [{start}, {end})"
            )));
        }
        if let Some(id) = self.pagination {
            self.nodes[id] = Node::Pagination { start, end };
        } else {
            let id = self.push_node(ROOT, Node::Pagination { start, end });
            self.pagination = Some(id);
        }
        Ok(self)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn push_node(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.parents.push(Some(parent));
        self.children[parent].push(id);
        id
    }

    fn add_condition(&mut self, parent: NodeId, condition: Condition) -> DbResult<NodeId> {
        condition.validate()?;
        if let ConditionValue::Subquery(sub) = &condition.value {
            if sub.contains_instance(self.instance_id) {
                return Err(DbError::invalid_query(format!(
                    "A query cannot be used as its own subquery (condition on '{}')",
                    condition.field
                )));
            }
        }
        Ok(self.push_node(parent, Node::Condition(condition)))
    }

    fn contains_instance(&self, instance_id: u64) -> bool {
        self.instance_id == instance_id
            || self.nodes.iter().any(|node| match node {
                Node::Condition(Condition {
                    value: ConditionValue::Subquery(sub),
                    ..
                }) => sub.contains_instance(instance_id),
                _ => false,
            })
    }

    fn check_group_parent(&self, parent: NodeId) -> DbResult<()> {
        match self.nodes.get(parent) {
            Some(Node::Root | Node::Logical(_)) => Ok(()),
            Some(_) => Err(DbError::invalid_query(format!(
                "Node {parent} cannot hold conditions"
            ))),
            None => Err(DbError::invalid_query(format!("Unknown parent node {parent}"))),
        }
    }

    fn group_at_root(&mut self, operator: LogicalOperator, elements: Vec<QueryElement>) -> DbResult<NodeId> {
        let id = self.push_node(ROOT, Node::Logical(operator));
        for pending in std::mem::take(&mut self.pending) {
            self.reparent(pending, id);
        }
        for element in elements {
            self.attach(id, element)?;
        }
        Ok(id)
    }

    fn reparent(&mut self, node: NodeId, new_parent: NodeId) {
        if let Some(old_parent) = self.parents[node] {
            self.children[old_parent].retain(|child| *child != node);
        }
        self.parents[node] = Some(new_parent);
        self.children[new_parent].push(node);
    }

    fn attach(&mut self, parent: NodeId, element: QueryElement) -> DbResult<()> {
        match element {
            QueryElement::Condition(condition) => {
                self.add_condition(parent, condition)?;
            }
            QueryElement::Group(group) => {
                self.logical_under(parent, group.operator, group.elements)?;
            }
            QueryElement::Builder(other) => {
                if other.contains_instance(self.instance_id) {
                    return Err(DbError::invalid_query(
                        "A query cannot be grafted into itself",
                    ));
                }
                for child in other.children(ROOT) {
                    if matches!(other.nodes[*child], Node::Condition(_) | Node::Logical(_)) {
                        self.graft(&other, *child, parent);
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the subtree rooted at `source_id` in `source` under `parent`.
    fn graft(&mut self, source: &Self, source_id: NodeId, parent: NodeId) {
        let id = self.push_node(parent, source.nodes[source_id].clone());
        for child in source.children(source_id) {
            self.graft(source, *child, id);
        }
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }
}
