//! Query builders for INSERT, UPDATE, DELETE operations.

use crate::clause::{Limit, Where};
use crate::expr::Expr;
use rowbind_core::{Connection, Dialect, Result, Value};

/// INSERT query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    table: Option<String>,
    values: Vec<(String, Value)>,
}

impl Insert {
    /// Create an empty INSERT.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Insert into `table` unless one is already set.
    pub fn table_or(self, table: &str) -> Self {
        if self.table.is_some() { self } else { self.table(table) }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Set the value of one column. A repeated column keeps its first
    /// position and takes the new value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
        self
    }

    /// Set several column values.
    pub fn values<C, V>(self, values: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .fold(self, |insert, (c, v)| insert.value(c, v))
    }

    /// Columns being inserted, in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(c, _)| c.as_str())
    }

    /// Build the INSERT SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the INSERT SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let table = self.table.as_deref().unwrap_or_default();
        if self.values.is_empty() {
            return (format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new());
        }

        let columns: Vec<_> = self
            .values
            .iter()
            .map(|(c, _)| dialect.quote_identifier(c))
            .collect();
        let placeholders: Vec<_> = (1..=self.values.len())
            .map(|i| dialect.placeholder(i))
            .collect();
        let params = self.values.iter().map(|(_, v)| v.clone()).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, params)
    }

    /// Execute the INSERT and return the generated identity.
    pub fn execute(&self, conn: &dyn Connection) -> Result<i64> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing INSERT");
        conn.insert(&sql, &params)
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    table: Option<String>,
    sets: Vec<(String, Value)>,
    where_clause: Option<Where>,
    limit: Option<Limit>,
}

impl Update {
    /// Create an empty UPDATE.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Update `table` unless one is already set.
    pub fn table_or(self, table: &str) -> Self {
        if self.table.is_some() { self } else { self.table(table) }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Assign a column. A repeated column takes the new value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.sets.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.sets.push((column, value)),
        }
        self
    }

    /// Whether any assignment was given.
    pub fn has_sets(&self) -> bool {
        !self.sets.is_empty()
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Where::push(self.where_clause, expr);
        self
    }

    /// Whether the update is scoped by any condition.
    pub fn has_filter(&self) -> bool {
        self.where_clause.is_some()
    }

    /// Limit affected rows. Only rendered by dialects that accept it.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Build the UPDATE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the UPDATE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut set_clauses = Vec::with_capacity(self.sets.len());

        for (column, value) in &self.sets {
            params.push(value.clone());
            set_clauses.push(format!(
                "{} = {}",
                dialect.quote_identifier(column),
                dialect.placeholder(params.len())
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table.as_deref().unwrap_or_default(),
            set_clauses.join(", ")
        );

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.expr().build_with_dialect(dialect, &mut params, 0));
        }

        if let Some(Limit(n)) = self.limit {
            if dialect.supports_dml_limit() {
                sql.push_str(&format!(" LIMIT {n}"));
            }
        }

        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub fn execute(&self, conn: &dyn Connection) -> Result<u64> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing UPDATE");
        conn.execute(&sql, &params)
    }
}

/// DELETE query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delete {
    table: Option<String>,
    where_clause: Option<Where>,
    limit: Option<Limit>,
}

impl Delete {
    /// Create an empty DELETE.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete from a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Delete from `table` unless one is already set.
    pub fn table_or(self, table: &str) -> Self {
        if self.table.is_some() { self } else { self.table(table) }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Where::push(self.where_clause, expr);
        self
    }

    /// Whether the delete is scoped by any condition.
    pub fn has_filter(&self) -> bool {
        self.where_clause.is_some()
    }

    /// Limit affected rows. Only rendered by dialects that accept it.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Build the DELETE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the DELETE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", self.table.as_deref().unwrap_or_default());
        let mut params = Vec::new();

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.expr().build_with_dialect(dialect, &mut params, 0));
        }

        if let Some(Limit(n)) = self.limit {
            if dialect.supports_dml_limit() {
                sql.push_str(&format!(" LIMIT {n}"));
            }
        }

        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub fn execute(&self, conn: &dyn Connection) -> Result<u64> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing DELETE");
        conn.execute(&sql, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert() {
        let insert = Insert::new()
            .table("person")
            .value("name", "Alice")
            .value("age", 30_i64);
        let (sql, params) = insert.build();
        assert_eq!(sql, "INSERT INTO person (\"name\", \"age\") VALUES ($1, $2)");
        assert_eq!(params, vec![Value::from("Alice"), Value::Int(30)]);
        assert_eq!(insert.columns().collect::<Vec<_>>(), vec!["name", "age"]);
    }

    #[test]
    fn test_insert_repeated_column_replaces() {
        let insert = Insert::new()
            .table("t")
            .values([("a", 1_i64), ("b", 2), ("a", 3)]);
        let (sql, params) = insert.build_with_dialect(Dialect::Sqlite);
        assert_eq!(sql, "INSERT INTO t (\"a\", \"b\") VALUES (?1, ?2)");
        assert_eq!(params, vec![Value::Int(3), Value::Int(2)]);
    }

    #[test]
    fn test_insert_default_values() {
        let (sql, params) = Insert::new().table("counter").build();
        assert_eq!(sql, "INSERT INTO counter DEFAULT VALUES");
        assert!(params.is_empty());
    }

    #[test]
    fn test_update_numbers_where_after_set() {
        let update = Update::new()
            .table("person")
            .set("name", "Bob")
            .filter(Expr::col("id").eq(7));
        let (sql, params) = update.build();
        assert_eq!(sql, "UPDATE person SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(params, vec![Value::from("Bob"), Value::Int(7)]);
        assert!(update.has_filter());
    }

    #[test]
    fn test_dml_limit_only_for_mysql() {
        let update = Update::new().table("t").set("a", 1_i64).limit(1);
        assert_eq!(update.build().0, "UPDATE t SET \"a\" = $1");
        assert_eq!(
            update.build_with_dialect(Dialect::Mysql).0,
            "UPDATE t SET `a` = ? LIMIT 1"
        );

        let delete = Delete::new().table("t").limit(5);
        assert_eq!(delete.build().0, "DELETE FROM t");
        assert_eq!(delete.build_with_dialect(Dialect::Mysql).0, "DELETE FROM t LIMIT 5");
    }

    #[test]
    fn test_delete_with_filter() {
        let delete = Delete::new()
            .table_or("person")
            .filter(Expr::col("email").eq("a@example.com"));
        let (sql, params) = delete.build();
        assert_eq!(sql, "DELETE FROM person WHERE \"email\" = $1");
        assert_eq!(params.len(), 1);
    }
}
