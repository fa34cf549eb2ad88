//! SELECT query builder.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::expr::Expr;
use rowbind_core::{Connection, Dialect, Result, Row, Value};

/// One item of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Column { name: String, alias: Option<String> },
    Expr { expr: Expr, alias: Option<String> },
}

/// What the query reads from.
#[derive(Debug, Clone, PartialEq)]
enum Source {
    Table(String),
    Subquery { query: Box<Select>, alias: String },
}

/// A SELECT query builder.
///
/// A query without a source renders no FROM target; callers that build on
/// behalf of an entity fill it in with [`Select::table_or`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    /// Table or subquery to read from
    source: Option<Source>,
    /// Columns to select (empty = all)
    columns: Vec<Projection>,
    /// WHERE clause conditions
    where_clause: Option<Where>,
    /// ORDER BY clauses
    order_by: Vec<OrderBy>,
    /// LIMIT clause
    limit: Option<Limit>,
    /// OFFSET clause
    offset: Option<Offset>,
    /// DISTINCT flag
    distinct: bool,
}

impl Select {
    /// Create an empty SELECT query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.source = Some(Source::Table(table.into()));
        self
    }

    /// Read from `table` unless a source is already set.
    pub fn table_or(self, table: &str) -> Self {
        if self.source.is_some() {
            self
        } else {
            self.table(table)
        }
    }

    /// Read from another query, aliased.
    pub fn from_subquery(mut self, query: Select, alias: impl Into<String>) -> Self {
        self.source = Some(Source::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    /// The table name, when reading from a table.
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            Some(Source::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Select specific columns.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols
            .iter()
            .map(|&name| Projection::Column {
                name: name.to_string(),
                alias: None,
            })
            .collect();
        self
    }

    /// Add one column to the SELECT list.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Projection::Column {
            name: name.into(),
            alias: None,
        });
        self
    }

    /// Add one column under another name.
    pub fn column_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.columns.push(Projection::Column {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Add a computed expression to the SELECT list.
    pub fn expr_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(Projection::Expr {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Whether an explicit SELECT list was given.
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Where::push(self.where_clause, expr);
        self
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Whether any ORDER BY clause was given.
    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Make this a DISTINCT query.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Build the SQL query and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the SQL query and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(dialect, &mut params);
        (sql, params)
    }

    fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<_> = self
                .columns
                .iter()
                .map(|p| {
                    let (item, alias) = match p {
                        Projection::Column { name, alias } => {
                            (dialect.quote_identifier(name), alias)
                        }
                        Projection::Expr { expr, alias } => {
                            (expr.build_with_dialect(dialect, params, 0), alias)
                        }
                    };
                    match alias {
                        Some(a) => format!("{item} AS {}", dialect.quote_identifier(a)),
                        None => item,
                    }
                })
                .collect();
            sql.push_str(&items.join(", "));
        }

        // FROM
        match &self.source {
            Some(Source::Table(table)) => {
                sql.push_str(" FROM ");
                sql.push_str(table);
            }
            Some(Source::Subquery { query, alias }) => {
                let inner = query.build_into(dialect, params);
                sql.push_str(&format!(" FROM ({inner}) AS {alias}"));
            }
            None => {}
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.expr().build_with_dialect(dialect, params, 0));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let order_strs: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build(dialect, params, 0))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_strs.join(", "));
        }

        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }

        sql
    }

    /// Execute the query and return all matching rows.
    pub fn all(&self, conn: &dyn Connection) -> Result<Vec<Row>> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing SELECT");
        conn.query(&sql, &params)
    }

    /// Execute the query and return the first matching row.
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        let query = self.clone().limit(1);
        let (sql, params) = query.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, params = params.len(), "Executing SELECT");
        conn.query_one(&sql, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_select() {
        let (sql, params) = Select::new().table("person").build();
        assert_eq!(sql, "SELECT * FROM person");
        assert!(params.is_empty());
    }

    #[test]
    fn test_select_with_everything() {
        let query = Select::new()
            .table("person")
            .column("id")
            .column_as("full_name", "name")
            .filter(Expr::col("age").gt(18))
            .filter(Expr::col("name").like("A%"))
            .order_by(OrderBy::desc("age"))
            .limit(10)
            .offset(20)
            .distinct();
        let (sql, params) = query.build();
        assert_eq!(
            sql,
            "SELECT DISTINCT \"id\", \"full_name\" AS \"name\" FROM person \
             WHERE \"age\" > $1 AND \"name\" LIKE $2 ORDER BY \"age\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![Value::Int(18), Value::from("A%")]);
    }

    #[test]
    fn test_table_or_keeps_existing_source() {
        let query = Select::new().table("people").table_or("person");
        assert_eq!(query.table_name(), Some("people"));
        let query = Select::new().table_or("person");
        assert_eq!(query.table_name(), Some("person"));
    }

    #[test]
    fn test_count_over_subquery_numbers_params_in_order() {
        let inner = Select::new()
            .table("person")
            .filter(Expr::col("age").eq(30));
        let query = Select::new()
            .from_subquery(inner, "t")
            .expr_as(Expr::count_star(), "total")
            .filter(Expr::raw("1 = 1").and(Expr::col("x").eq(1)));
        let (sql, params) = query.build_with_dialect(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS \"total\" FROM (SELECT * FROM person WHERE \"age\" = ?1) AS t \
             WHERE 1 = 1 AND \"x\" = ?2"
        );
        assert_eq!(params, vec![Value::Int(30), Value::Int(1)]);
    }

    #[test]
    fn test_columns_replaces_list() {
        let query = Select::new().table("t").column("a").columns(&["b", "c"]);
        assert!(query.has_columns());
        assert_eq!(query.build().0, "SELECT \"b\", \"c\" FROM t");
    }
}
