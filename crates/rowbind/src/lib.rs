//! Rowbind - live entity models over relational rows.
//!
//! Rowbind maps database rows onto runtime-described entities:
//!
//! - Schema metadata built once per type and shared by every instance
//! - Field normalization on every write
//! - Change tracking against the last persisted state
//! - Lazy loading of rows and of related entities
//! - Persistence operations that describe their own SQL
//!
//! # Quick Start
//!
//! ```ignore
//! use rowbind::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! registry
//!     .register("person", |meta: &mut MetaBuilder| {
//!         meta.field(Field::auto("id").primary())
//!             .field(Field::string("name").default(""))
//!             .field(Field::integer("age").default(0))
//!             .relation(Relation::has_many("pets", "pet").using("id", "owner_id"));
//!     })
//!     .register("pet", |meta: &mut MetaBuilder| {
//!         meta.field(Field::auto("id").primary())
//!             .field(Field::integer("owner_id"))
//!             .field(Field::string("name"));
//!     });
//!
//! // Create
//! let mut alice = registry.model("person", Arc::clone(&conn))?;
//! alice.set("name", "Alice")?;
//! alice.set("age", "31")?; // stored as Value::Int(31)
//! alice.create(None)?;
//!
//! // Read lazily: setting a unique field prepares the model
//! let mut found = registry.model("person", Arc::clone(&conn))?;
//! found.set("id", 7)?;
//! let name = found.get("name")?; // SELECT ... WHERE "id" = $1 LIMIT 1
//!
//! // Update only what changed
//! found.set("age", 32)?;
//! found.save()?;
//!
//! // Relations load on first access
//! let pets = found.related("pets")?.as_many().len();
//! ```

pub mod field;
pub mod meta;
pub mod model;
pub mod registry;
pub mod relation;

pub use field::{Field, FieldKind, FieldType, OnChange, TimestampBehavior};
pub use meta::{Alias, AliasFn, AttributeKind, Meta, MetaBuilder, Schema};
pub use model::{Attribute, Model, RowLimit, State};
pub use registry::Registry;
pub use relation::{Related, Relation, RelationKind};

pub use rowbind_core::{
    AttributeErrorKind, Callback, Change, Connection, Dialect, Error, Filter, Result, Row, Rule,
    RuleValidator, Storage, UnscopedErrorKind, Validation, ValidationError, Validator, Value,
};
pub use rowbind_query::{
    Delete, Expr, Insert, OrderBy, OrderDirection, Select, Update, raw_execute, raw_query,
};

/// Everything needed to declare schemas and work with models.
pub mod prelude {
    pub use crate::{
        Alias, Attribute, AttributeErrorKind, Callback, Connection, Delete, Dialect, Error, Expr,
        Field, FieldKind, FieldType, Filter, Insert, Meta, MetaBuilder, Model, OnChange, OrderBy,
        OrderDirection, Registry, Related, Relation, RelationKind, Result, Row, RowLimit, Rule,
        RuleValidator, Schema, Select, UnscopedErrorKind, Update, Validation, Validator, Value,
    };
}
