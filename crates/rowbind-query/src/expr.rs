//! SQL expressions for query building.
//!
//! Conditions handed to the builders are `Expr` trees. Values are never
//! inlined: every literal is pushed to the parameter list and rendered as a
//! dialect placeholder.

use crate::clause::{OrderBy, OrderDirection};
use rowbind_core::{Dialect, Value};

/// A SQL expression that can be used in WHERE, projections and ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(String),

    /// Literal value, always bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// COUNT(*)
    CountStar,

    /// IN expression
    In { expr: Box<Expr>, values: Vec<Expr> },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Raw SQL fragment (escape hatch)
    Raw(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    And,
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// For `=` and `<>`, whether a NULL comparison is negated.
    const fn null_test(self) -> Option<bool> {
        match self {
            BinaryOp::Eq => Some(false),
            BinaryOp::Ne => Some(true),
            _ => None,
        }
    }

    /// Get the precedence of this operator (higher binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Like => 3,
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== Comparison Operators ====================

    /// Equal to (=). Against a NULL literal this renders `IS NULL`.
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>). Against a NULL literal this renders `IS NOT NULL`.
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// LIKE pattern, bound as a parameter.
    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.binary(BinaryOp::Like, Expr::Literal(Value::Text(pattern.into())))
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Join conditions with AND. Returns `None` for an empty list.
    pub fn all(conditions: impl IntoIterator<Item = Expr>) -> Option<Self> {
        conditions.into_iter().reduce(Expr::and)
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== Sets ====================

    /// IN (values...)
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    // ==================== Functions ====================

    /// COUNT(*) aggregate function.
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    // ==================== Ordering ====================

    /// Create an ascending ORDER BY expression.
    pub fn asc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Asc)
    }

    /// Create a descending ORDER BY expression.
    pub fn desc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Desc)
    }

    // ==================== SQL Generation ====================

    /// Build SQL string and collect parameters (default PostgreSQL dialect).
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        self.build_with_dialect(Dialect::Postgres, params, offset)
    }

    /// Build SQL string with specific dialect.
    ///
    /// `offset` is the number of parameters already bound by the enclosing
    /// statement before `params`.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column(name) => dialect.quote_identifier(name),

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                // `= NULL` never matches under three-valued logic.
                if let Some(negated) = op.null_test() {
                    match (left.as_ref(), right.as_ref()) {
                        (operand, Expr::Literal(Value::Null))
                        | (Expr::Literal(Value::Null), operand) => {
                            let not_str = if negated { " NOT" } else { "" };
                            let sql = operand.build_operand(*op, dialect, params, offset);
                            return format!("{sql} IS{not_str} NULL");
                        }
                        _ => {}
                    }
                }
                let left_sql = left.build_operand(*op, dialect, params, offset);
                let right_sql = right.build_operand(*op, dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::In { expr, values } => {
                if values.is_empty() {
                    // IN () is invalid SQL; an empty set matches nothing.
                    return "1 = 0".to_string();
                }
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("{expr_sql} IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Raw(sql) => sql.clone(),
        }
    }

    /// Build an operand of `parent`, parenthesizing looser-binding children.
    fn build_operand(
        &self,
        parent: BinaryOp,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let sql = self.build_with_dialect(dialect, params, offset);
        match self {
            Expr::Binary { op, .. } if op.precedence() < parent.precedence() => {
                format!("({sql})")
            }
            _ => sql,
        }
    }
}

// Conversion from Value to Expr
impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(i64::from(n)))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Float(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_simple() {
        let mut params = Vec::new();
        assert_eq!(Expr::col("name").build(&mut params, 0), "\"name\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_null_comparison_is_a_null_test() {
        let mut params = Vec::new();
        let sql = Expr::col("status")
            .eq(Value::Null)
            .and(Expr::col("owner").ne(Value::Null))
            .and(Expr::col("age").eq(3))
            .build(&mut params, 0);
        assert_eq!(
            sql,
            "\"status\" IS NULL AND \"owner\" IS NOT NULL AND \"age\" = $1"
        );
        assert_eq!(params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_literal_is_bound() {
        let mut params = Vec::new();
        let sql = Expr::col("age").ge(18).build(&mut params, 0);
        assert_eq!(sql, "\"age\" >= $1");
        assert_eq!(params, vec![Value::Int(18)]);
    }

    #[test]
    fn test_offset_continues_numbering() {
        let mut params = Vec::new();
        let sql = Expr::col("id").eq(7).build(&mut params, 3);
        assert_eq!(sql, "\"id\" = $4");
    }

    #[test]
    fn test_and_chain() {
        let cond = Expr::all([
            Expr::col("a").eq(1),
            Expr::col("b").eq(2),
            Expr::col("c").eq(3),
        ])
        .unwrap();
        let mut params = Vec::new();
        assert_eq!(
            cond.build(&mut params, 0),
            "\"a\" = $1 AND \"b\" = $2 AND \"c\" = $3"
        );
        assert!(Expr::all(Vec::new()).is_none());
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let cond = Expr::col("a")
            .eq(1)
            .or(Expr::col("b").eq(2))
            .and(Expr::col("c").is_null());
        let mut params = Vec::new();
        assert_eq!(
            cond.build(&mut params, 0),
            "(\"a\" = $1 OR \"b\" = $2) AND \"c\" IS NULL"
        );
    }

    #[test]
    fn test_in_list() {
        let mut params = Vec::new();
        let sql = Expr::col("id")
            .in_list(vec![1_i64, 2, 3])
            .build_with_dialect(Dialect::Sqlite, &mut params, 0);
        assert_eq!(sql, "\"id\" IN (?1, ?2, ?3)");

        let mut params = Vec::new();
        let empty: Vec<i64> = Vec::new();
        assert_eq!(Expr::col("id").in_list(empty).build(&mut params, 0), "1 = 0");
    }

    #[test]
    fn test_like_and_mysql_quoting() {
        let mut params = Vec::new();
        let sql = Expr::col("name")
            .like("A%")
            .build_with_dialect(Dialect::Mysql, &mut params, 0);
        assert_eq!(sql, "`name` LIKE ?");
        assert_eq!(params, vec![Value::from("A%")]);
    }

    #[test]
    fn test_count_star() {
        let mut params = Vec::new();
        assert_eq!(Expr::count_star().build(&mut params, 0), "COUNT(*)");
    }
}
