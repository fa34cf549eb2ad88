//! Error types for Rowbind operations.

use std::fmt;

/// The primary error type for all Rowbind operations.
#[derive(Debug)]
pub enum Error {
    /// Access to an attribute the entity type does not define, or an
    /// access the attribute's kind does not allow
    Attribute(AttributeError),
    /// Schema/registry errors (unconfigured type, invalid definition)
    Schema(SchemaError),
    /// Connection-related errors reported by the connection collaborator
    Connection(ConnectionError),
    /// Query execution errors reported by the connection collaborator
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Validation errors
    Validation(ValidationError),
    /// A single-row write that identifies no row
    Unscoped(UnscopedError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct AttributeError {
    pub kind: AttributeErrorKind,
    /// Entity type the attribute was looked up on
    pub model: String,
    /// Attribute name as given by the caller
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeErrorKind {
    /// Not a field, alias or relation of the type
    Undefined,
    /// Aliases are computed and cannot be written
    ReadOnly,
    /// Relations hold models, not values
    NotAValue,
}

/// Refusal to run an UPDATE or DELETE without identifying conditions.
#[derive(Debug, Clone)]
pub struct UnscopedError {
    pub kind: UnscopedErrorKind,
    /// Entity type of the refused write
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnscopedErrorKind {
    Update,
    Delete,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// No schema definition registered for the requested type
    Unconfigured,
    /// Schema definition is inconsistent
    Invalid,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// Validation error for field-level validation.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The errors in the order they were found
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Value is below minimum
    Min,
    /// Value is above maximum
    Max,
    /// String is shorter than minimum length
    MinLength,
    /// String is longer than maximum length
    MaxLength,
    /// Value doesn't match regex pattern
    Pattern,
    /// Required field is missing/null
    Required,
    /// Value is not one of the allowed choices
    Choice,
    /// Named callback rejected the value
    Custom,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Errors recorded for one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Build an attribute error.
    pub fn attribute(
        kind: AttributeErrorKind,
        model: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Error::Attribute(AttributeError {
            kind,
            model: model.into(),
            name: name.into(),
        })
    }

    /// Build the error raised for a type with no schema definition.
    pub fn unconfigured(type_name: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::Unconfigured,
            message: format!("no schema registered for type '{type_name}'"),
        })
    }

    /// Build the error raised for a single-row write with no conditions.
    pub fn unscoped(kind: UnscopedErrorKind, model: impl Into<String>) -> Self {
        Error::Unscoped(UnscopedError {
            kind,
            model: model.into(),
        })
    }

    /// Was a single-row write refused for lack of identifying conditions?
    pub fn is_unscoped(&self) -> bool {
        matches!(self, Error::Unscoped(_))
    }

    /// Is this an undefined-attribute error?
    pub fn is_undefined_attribute(&self) -> bool {
        matches!(self, Error::Attribute(a) if a.kind == AttributeErrorKind::Undefined)
    }

    /// Is this a failure reported by the connection collaborator?
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Error::Query(_) | Error::Connection(_))
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Attribute(e) => write!(f, "Attribute error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Unscoped(e) => write!(f, "Unscoped write: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AttributeErrorKind::Undefined => {
                write!(f, "undefined attribute '{}' on '{}'", self.name, self.model)
            }
            AttributeErrorKind::ReadOnly => {
                write!(f, "attribute '{}' on '{}' is read-only", self.name, self.model)
            }
            AttributeErrorKind::NotAValue => write!(
                f,
                "attribute '{}' on '{}' is a relation, not a value",
                self.name, self.model
            ),
        }
    }
}

impl fmt::Display for UnscopedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = match self.kind {
            UnscopedErrorKind::Update => "update",
            UnscopedErrorKind::Delete => "delete",
        };
        write!(
            f,
            "refusing to {operation} '{}' without identifying conditions",
            self.model
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<AttributeError> for Error {
    fn from(err: AttributeError) -> Self {
        Error::Attribute(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<UnscopedError> for Error {
    fn from(err: UnscopedError) -> Self {
        Error::Unscoped(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Result type alias for Rowbind operations.
pub type Result<T> = std::result::Result<T, Error>;
