//! Core types and traits for Rowbind.
//!
//! This crate provides the leaf abstractions every other layer builds on:
//!
//! - `Value` and `Row` for dynamically typed attribute and column data
//! - `Storage` for change tracking of one entity's attributes
//! - `Connection` trait for the blocking database collaborator
//! - `Validator` trait and the bundled `RuleValidator`
//! - `Error` and `Result` shared by the whole workspace

pub mod connection;
pub mod dialect;
pub mod error;
pub mod row;
pub mod storage;
pub mod validate;
pub mod value;

pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{
    AttributeError, AttributeErrorKind, ConnectionError, ConnectionErrorKind, Error,
    FieldValidationError, QueryError, QueryErrorKind, Result, SchemaError, SchemaErrorKind,
    TypeError, UnscopedError, UnscopedErrorKind, ValidationError, ValidationErrorKind,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use storage::{Change, Storage};
pub use validate::{
    Callback, Filter, Rule, RuleValidator, Validation, ValidationBindings, ValidationRequest,
    Validator, matches_pattern,
};
pub use value::Value;
