//! Query descriptions for Rowbind.
//!
//! `rowbind-query` is the **query construction layer**. It provides the
//! fluent builders and expression DSL the entity core uses to describe
//! reads and writes, and turns them into SQL text plus positional
//! parameters for a given [`Dialect`](rowbind_core::Dialect).
//!
//! - **Builders**: [`Select`], [`Insert`], [`Update`], [`Delete`].
//! - **Expression DSL**: [`Expr`] builds WHERE conditions and projections.
//! - **Execution**: each builder runs through a `&dyn Connection` from
//!   `rowbind-core`, using the connection's own dialect.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod select;

pub use builder::{Delete, Insert, Update};
pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use expr::{BinaryOp, Expr};
pub use select::Select;

use rowbind_core::{Connection, Result, Row, Value};

/// Raw SQL query execution.
///
/// For queries that can't be expressed with the builders.
pub fn raw_query(conn: &dyn Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    tracing::trace!(sql = %sql, params = params.len(), "Executing raw query");
    conn.query(sql, params)
}

/// Raw SQL statement execution.
pub fn raw_execute(conn: &dyn Connection, sql: &str, params: &[Value]) -> Result<u64> {
    tracing::trace!(sql = %sql, params = params.len(), "Executing raw statement");
    conn.execute(sql, params)
}
