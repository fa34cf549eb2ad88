//! Validation collaborator.
//!
//! Entity schemas carry per-attribute validation metadata (labels, input
//! filters, rules and named callbacks, plus named contexts selecting which
//! attributes are checked). The entity core only assembles that metadata and
//! the data to check into a [`ValidationRequest`]; the checking itself is
//! done by a [`Validator`]. [`RuleValidator`] is the bundled implementation.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::Value;
use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::row::Row;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime
/// of the program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(pattern.to_string(), regex.clone());
        }
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// An invalid pattern is logged and treated as a non-match.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Input normalization applied before rules run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Strip surrounding whitespace from text.
    Trim,
    /// Lowercase text.
    Lowercase,
    /// Uppercase text.
    Uppercase,
    /// Turn empty text into NULL.
    EmptyToNull,
}

impl Filter {
    /// Apply the filter to a value. Non-text values pass through.
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (Filter::Trim, Value::Text(s)) => Value::Text(s.trim().to_string()),
            (Filter::Lowercase, Value::Text(s)) => Value::Text(s.to_lowercase()),
            (Filter::Uppercase, Value::Text(s)) => Value::Text(s.to_uppercase()),
            (Filter::EmptyToNull, Value::Text(s)) if s.is_empty() => Value::Null,
            (_, other) => other,
        }
    }
}

/// A declarative constraint on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Value must not be empty.
    Required,
    /// Text must have at least this many characters.
    MinLength(usize),
    /// Text must have at most this many characters.
    MaxLength(usize),
    /// Number must be at least this.
    Min(f64),
    /// Number must be at most this.
    Max(f64),
    /// Text must match this regular expression.
    Pattern(String),
    /// Text must look like an email address.
    Email,
    /// Value must equal one of these.
    OneOf(Vec<Value>),
}

impl Rule {
    /// Check a value, returning the violation kind and message on failure.
    ///
    /// Every rule except `Required` accepts empty values.
    fn check(&self, label: &str, value: &Value) -> Option<(ValidationErrorKind, String)> {
        if let Rule::Required = self {
            return value
                .is_empty()
                .then(|| (ValidationErrorKind::Required, format!("{label} is required")));
        }
        if value.is_empty() {
            return None;
        }

        match self {
            Rule::Required => None,
            Rule::MinLength(min) => {
                let len = value.as_str()?.chars().count();
                (len < *min).then(|| {
                    (
                        ValidationErrorKind::MinLength,
                        format!("{label} must be at least {min} characters, got {len}"),
                    )
                })
            }
            Rule::MaxLength(max) => {
                let len = value.as_str()?.chars().count();
                (len > *max).then(|| {
                    (
                        ValidationErrorKind::MaxLength,
                        format!("{label} must be at most {max} characters, got {len}"),
                    )
                })
            }
            Rule::Min(min) => {
                let n = value.as_f64()?;
                (n < *min).then(|| {
                    (
                        ValidationErrorKind::Min,
                        format!("{label} must be at least {min}, got {n}"),
                    )
                })
            }
            Rule::Max(max) => {
                let n = value.as_f64()?;
                (n > *max).then(|| {
                    (
                        ValidationErrorKind::Max,
                        format!("{label} must be at most {max}, got {n}"),
                    )
                })
            }
            Rule::Pattern(pattern) => {
                let text = value.as_str()?;
                (!matches_pattern(text, pattern)).then(|| {
                    (
                        ValidationErrorKind::Pattern,
                        format!("{label} must match pattern '{pattern}'"),
                    )
                })
            }
            Rule::Email => {
                let text = value.as_str()?;
                (!matches_pattern(text, EMAIL_PATTERN)).then(|| {
                    (
                        ValidationErrorKind::Pattern,
                        format!("{label} must be a valid email address"),
                    )
                })
            }
            Rule::OneOf(choices) => (!choices.contains(value)).then(|| {
                let allowed: Vec<String> = choices.iter().map(ToString::to_string).collect();
                (
                    ValidationErrorKind::Choice,
                    format!("{label} must be one of: {}", allowed.join(", ")),
                )
            }),
        }
    }
}

/// A named check implemented in code.
///
/// Callbacks are plain function pointers so schemas stay inspectable.
#[derive(Debug, Clone, Copy)]
pub struct Callback {
    /// Name reported in logs.
    pub name: &'static str,
    /// Returns an error message when the value is rejected.
    pub check: fn(&Value) -> std::result::Result<(), String>,
}

impl Callback {
    pub const fn new(
        name: &'static str,
        check: fn(&Value) -> std::result::Result<(), String>,
    ) -> Self {
        Self { name, check }
    }
}

/// Per-attribute validation metadata of one entity type.
#[derive(Debug, Clone, Default)]
pub struct ValidationBindings {
    pub labels: HashMap<String, String>,
    pub filters: HashMap<String, Vec<Filter>>,
    pub rules: HashMap<String, Vec<Rule>>,
    pub callbacks: HashMap<String, Vec<Callback>>,
    /// Named contexts ("create", "update", ...) listing the attributes
    /// they check.
    pub contexts: HashMap<String, Vec<String>>,
}

impl ValidationBindings {
    /// Human-readable label for an attribute, defaulting to its name.
    pub fn label<'a>(&'a self, field: &'a str) -> &'a str {
        self.labels.get(field).map_or(field, String::as_str)
    }

    /// Whether any filter, rule or callback is bound to the attribute.
    pub fn is_bound(&self, field: &str) -> bool {
        self.filters.get(field).is_some_and(|f| !f.is_empty())
            || self.rules.get(field).is_some_and(|r| !r.is_empty())
            || self.callbacks.get(field).is_some_and(|c| !c.is_empty())
    }

    /// Whether an attribute is checked in the given context.
    ///
    /// A context without an explicit attribute list checks every bound
    /// attribute.
    pub fn in_context(&self, context: Option<&str>, field: &str) -> bool {
        match context.and_then(|c| self.contexts.get(c)) {
            Some(fields) => fields.iter().any(|f| f == field),
            None => self.is_bound(field),
        }
    }
}

/// Everything a validator needs to check one entity.
#[derive(Debug, Clone)]
pub struct ValidationRequest<'a> {
    /// Entity type being validated.
    pub model: &'a str,
    /// Named context, if any.
    pub context: Option<&'a str>,
    pub bindings: &'a ValidationBindings,
    /// Attribute values to check.
    pub data: Row,
}

/// The outcome of a validation: filtered data plus any errors.
#[derive(Debug, Clone)]
pub struct Validation {
    data: Row,
    errors: ValidationError,
}

impl Validation {
    pub fn new(data: Row, errors: ValidationError) -> Self {
        Self { data, errors }
    }

    /// Check whether every rule passed.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors found, in the order they were found.
    pub fn errors(&self) -> &ValidationError {
        &self.errors
    }

    /// Data after filters were applied.
    pub fn data(&self) -> &Row {
        &self.data
    }

    /// Return the filtered data, or the errors as `Error::Validation`.
    pub fn into_result(self) -> Result<Row> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

/// Checks entity data against its validation bindings.
pub trait Validator {
    fn validate(&self, request: ValidationRequest<'_>) -> Validation;
}

/// The bundled validator: filters first, then rules, then callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    #[tracing::instrument(level = "debug", skip(self, request), fields(model = request.model))]
    fn validate(&self, request: ValidationRequest<'_>) -> Validation {
        let bindings = request.bindings;
        let mut errors = ValidationError::new();
        let mut pairs = Vec::with_capacity(request.data.len());

        for (field, value) in request.data.iter() {
            if !bindings.in_context(request.context, field) {
                pairs.push((field.to_string(), value.clone()));
                continue;
            }

            let value = bindings
                .filters
                .get(field)
                .into_iter()
                .flatten()
                .fold(value.clone(), |v, filter| filter.apply(v));

            let label = bindings.label(field);
            for rule in bindings.rules.get(field).into_iter().flatten() {
                if let Some((kind, message)) = rule.check(label, &value) {
                    errors.add(field, kind, message);
                }
            }
            for callback in bindings.callbacks.get(field).into_iter().flatten() {
                if let Err(message) = (callback.check)(&value) {
                    tracing::trace!(field, callback = callback.name, "Callback rejected value");
                    errors.add(field, ValidationErrorKind::Custom, message);
                }
            }

            pairs.push((field.to_string(), value));
        }

        tracing::debug!(error_count = errors.errors.len(), "Validation finished");
        Validation::new(Row::from_pairs(pairs), errors)
    }
}
