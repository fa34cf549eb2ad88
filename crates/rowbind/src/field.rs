//! Field descriptors and value normalization.
//!
//! Every attribute write goes through [`Field::normalize`], so normalization
//! is total: any input maps to a value of the field's type or to `Null`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rowbind_core::Value;

use crate::model::Model;

/// A user-defined field type.
pub trait FieldType: Send + Sync + fmt::Debug {
    /// Name reported in logs.
    fn name(&self) -> &'static str;

    /// Coerce a raw value. Must not panic for any input.
    fn normalize(&self, raw: Value) -> Value;
}

/// A hook run on every attribute write outside of loading.
///
/// The hook sees the model as it is before the write and returns the value
/// to store instead of the normalized one.
pub trait OnChange: Send + Sync + fmt::Debug {
    /// Name reported in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, model: &Model, value: Value) -> Value;
}

/// When the persistence layer stamps a timestamp field with the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampBehavior {
    #[default]
    None,
    OnCreate,
    OnUpdate,
    Both,
}

impl TimestampBehavior {
    pub const fn on_create(self) -> bool {
        matches!(self, TimestampBehavior::OnCreate | TimestampBehavior::Both)
    }

    pub const fn on_update(self) -> bool {
        matches!(self, TimestampBehavior::OnUpdate | TimestampBehavior::Both)
    }
}

/// The closed set of field variants.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Database-generated identity. Never inserted; assigned after INSERT.
    Auto,
    String,
    Integer,
    Float,
    Boolean,
    Timestamp {
        auto_now_create: bool,
        auto_now_update: bool,
    },
    Json,
    Custom(Arc<dyn FieldType>),
}

impl FieldKind {
    /// Short name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Auto => "auto",
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp { .. } => "timestamp",
            FieldKind::Json => "json",
            FieldKind::Custom(t) => t.name(),
        }
    }
}

/// Descriptor of one stored attribute.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    default: Value,
    primary: bool,
    unique: bool,
    on_change: Option<Arc<dyn OnChange>>,
}

impl Field {
    /// Create a field of the given kind with a `Null` default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Value::Null,
            primary: false,
            unique: false,
            on_change: None,
        }
    }

    pub fn auto(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Auto)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// A timestamp field that is never stamped automatically.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Timestamp {
                auto_now_create: false,
                auto_now_update: false,
            },
        )
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub fn custom(name: impl Into<String>, field_type: impl FieldType + 'static) -> Self {
        Self::new(name, FieldKind::Custom(Arc::new(field_type)))
    }

    /// Set the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Mark as primary key. Primary fields are also unique once the schema
    /// is finished.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn on_change(mut self, hook: impl OnChange + 'static) -> Self {
        self.on_change = Some(Arc::new(hook));
        self
    }

    /// Stamp with the current time on create. No effect on non-timestamp
    /// fields.
    #[must_use]
    pub fn auto_now_create(mut self) -> Self {
        if let FieldKind::Timestamp {
            auto_now_create, ..
        } = &mut self.kind
        {
            *auto_now_create = true;
        }
        self
    }

    /// Stamp with the current time on update. No effect on non-timestamp
    /// fields.
    #[must_use]
    pub fn auto_now_update(mut self) -> Self {
        if let FieldKind::Timestamp {
            auto_now_update, ..
        } = &mut self.kind
        {
            *auto_now_update = true;
        }
        self
    }

    pub(crate) fn set_unique(&mut self, unique: bool) {
        self.unique = unique;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The raw default, before normalization.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn on_change_hook(&self) -> Option<&Arc<dyn OnChange>> {
        self.on_change.as_ref()
    }

    /// Whether the database generates this field's value.
    pub fn is_identity(&self) -> bool {
        matches!(self.kind, FieldKind::Auto)
    }

    pub fn timestamp_behavior(&self) -> TimestampBehavior {
        match self.kind {
            FieldKind::Timestamp {
                auto_now_create: true,
                auto_now_update: true,
            } => TimestampBehavior::Both,
            FieldKind::Timestamp {
                auto_now_create: true,
                ..
            } => TimestampBehavior::OnCreate,
            FieldKind::Timestamp {
                auto_now_update: true,
                ..
            } => TimestampBehavior::OnUpdate,
            _ => TimestampBehavior::None,
        }
    }

    /// Coerce a raw value into this field's representation.
    ///
    /// `Null` stays `Null` for every kind. Input that cannot be read as the
    /// field's type becomes `Null`.
    pub fn normalize(&self, raw: Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }
        match &self.kind {
            FieldKind::Auto | FieldKind::Integer => to_integer(raw),
            FieldKind::String => to_text(raw),
            FieldKind::Float => to_float(raw),
            FieldKind::Boolean => to_boolean(raw),
            FieldKind::Timestamp { .. } => to_timestamp(raw),
            FieldKind::Json => to_json(raw),
            FieldKind::Custom(t) => t.normalize(raw),
        }
    }
}

fn float_to_int(f: f64) -> Value {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Value::Int(f.trunc() as i64)
    } else {
        Value::Null
    }
}

fn to_integer(raw: Value) -> Value {
    match raw {
        Value::Int(v) => Value::Int(v),
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::Float(f) => float_to_int(f),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Int)
                .or_else(|_| s.parse::<f64>().map(float_to_int))
                .unwrap_or(Value::Null)
        }
        Value::Json(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(float_to_int))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn to_text(raw: Value) -> Value {
    match raw {
        Value::Text(s) => Value::Text(s),
        Value::Bytes(b) => String::from_utf8(b).map_or(Value::Null, Value::Text),
        Value::Json(serde_json::Value::String(s)) => Value::Text(s),
        other => Value::Text(other.to_string()),
    }
}

fn to_float(raw: Value) -> Value {
    match raw {
        Value::Float(f) => Value::Float(f),
        Value::Int(v) => Value::Float(v as f64),
        Value::Bool(b) => Value::Float(if b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse::<f64>().map_or(Value::Null, Value::Float),
        Value::Json(serde_json::Value::Number(n)) => n.as_f64().map_or(Value::Null, Value::Float),
        _ => Value::Null,
    }
}

fn to_boolean(raw: Value) -> Value {
    match raw {
        Value::Bool(b) => Value::Bool(b),
        Value::Int(v) => Value::Bool(v != 0),
        Value::Float(f) => Value::Bool(f != 0.0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Value::Bool(true),
            "0" | "false" | "f" | "no" | "n" | "off" | "" => Value::Bool(false),
            _ => Value::Null,
        },
        Value::Json(serde_json::Value::Bool(b)) => Value::Bool(b),
        _ => Value::Null,
    }
}

/// Integers and floats are read as Unix seconds.
fn to_timestamp(raw: Value) -> Value {
    match raw {
        Value::Timestamp(us) => Value::Timestamp(us),
        Value::Int(secs) => secs
            .checked_mul(1_000_000)
            .map_or(Value::Null, Value::Timestamp),
        Value::Float(secs) => {
            let us = secs * 1_000_000.0;
            if us.is_finite() && us.abs() < 9.0e18 {
                Value::Timestamp(us.round() as i64)
            } else {
                Value::Null
            }
        }
        Value::Text(s) => parse_timestamp(s.trim()).map_or(Value::Null, Value::from),
        Value::Json(serde_json::Value::String(s)) => {
            parse_timestamp(s.trim()).map_or(Value::Null, Value::from)
        }
        _ => Value::Null,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn to_json(raw: Value) -> Value {
    match raw {
        Value::Json(v) => Value::Json(v),
        Value::Text(s) => serde_json::from_str(&s).map_or(Value::Null, Value::Json),
        other => Value::Json(other.to_json()),
    }
}
