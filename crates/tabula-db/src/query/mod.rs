//! Query construction and SQL compilation.
//!
//! - [`builder`] - The arena-based query AST ([`QueryBuilder`])
//! - [`compiler`] - AST to SQL compilation ([`QueryCompiler`])
//! - [`params`] - Positional and named parameter accumulation
//! - [`statement`] - [`Statement`], [`StatementConfig`] and [`StatementFactory`]

pub mod builder;
pub mod compiler;
pub mod params;
pub mod statement;

pub use builder::{
    Aggregate, AggregateFunction, Condition, ConditionValue, LogicalGroup, LogicalOperator, Node,
    NodeId, Operator, QueryBuilder, QueryElement, SortCriteria, SortDirection, ROOT,
};
pub use compiler::{quote_identifier, QueryCompiler, ALWAYS_FALSE};
pub use params::ParamManager;
pub use statement::{
    ArraySyntax, CaseHandler, ColumnTypeResolver, FieldResolver, ParamStyle, Statement,
    StatementConfig, StatementFactory,
};
