//! Database connection trait.
//!
//! The entity core never talks to a database directly. Every statement it
//! produces goes through a [`Connection`], which is an opaque, blocking
//! handle supplied by the caller. Cancellation, timeouts and retries are the
//! connection's business; errors it reports are propagated unchanged.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A database connection capable of executing statements.
///
/// Implementations must be `Send + Sync` so a connection can be shared by
/// every model built from the same registry.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query("SELECT * FROM person WHERE id = $1", &[Value::Int(7)])?;
/// let id = conn.insert("INSERT INTO person (name) VALUES ($1)", &[Value::from("Alice")])?;
/// ```
pub trait Connection: Send + Sync {
    /// SQL flavor this connection speaks.
    fn dialect(&self) -> Dialect {
        Dialect::default()
    }

    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement (UPDATE, DELETE) and return rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the generated identity.
    ///
    /// For PostgreSQL this typically appends `RETURNING`; the exact
    /// mechanism is up to the driver.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}
