//! Relation descriptors and lazy loading of related models.

use rowbind_core::Result;
use rowbind_query::{Expr, Select};

use crate::model::{Model, RowLimit};

/// The relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This model holds the key of one other model.
    BelongsTo,
    /// One other model holds this model's key.
    HasOne,
    /// Many other models hold this model's key.
    HasMany,
}

impl RelationKind {
    pub const fn is_many(self) -> bool {
        matches!(self, RelationKind::HasMany)
    }
}

/// A lazily resolved cross-entity attribute.
///
/// `using` pairs a local attribute with the attribute of the related type
/// that must hold the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    name: String,
    kind: RelationKind,
    model: String,
    using: Vec<(String, String)>,
}

impl Relation {
    pub fn new(name: impl Into<String>, kind: RelationKind, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            using: Vec::new(),
        }
    }

    pub fn belongs_to(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, model)
    }

    pub fn has_one(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, model)
    }

    pub fn has_many(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, model)
    }

    /// Join on `local = foreign`. Pairs accumulate in order.
    #[must_use]
    pub fn using(mut self, local: impl Into<String>, foreign: impl Into<String>) -> Self {
        self.using.push((local.into(), foreign.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Type identifier of the related entity.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// `(local, foreign)` attribute pairs.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.using
    }

    pub(crate) fn retain_pairs(&mut self, keep: impl FnMut(&(String, String)) -> bool) {
        self.using.retain(keep);
    }

    /// Resolve the related value for `owner`.
    ///
    /// If any local key is empty nothing can match, so no query is issued.
    #[tracing::instrument(level = "debug", skip(self, owner), fields(relation = %self.name))]
    pub fn read(&self, owner: &mut Model) -> Result<Related> {
        let mut keys = Vec::with_capacity(self.using.len());
        for (local, foreign) in &self.using {
            let value = owner.get(local)?;
            if value.is_empty() {
                tracing::trace!(local = %local, "Empty relation key, skipping query");
                return Ok(Related::empty(self.kind));
            }
            keys.push((foreign, value));
        }

        let mut target = owner
            .registry()
            .model(&self.model, std::sync::Arc::clone(owner.connection()))?;

        // Writing the keys makes them part of the target's query conditions.
        // A key equal to the field default does not register as a change and
        // needs an explicit condition.
        let mut query = Select::new();
        for (foreign, value) in keys {
            target.set(foreign, value.clone())?;
            if !target.is_changed(foreign) {
                query = query.filter(Expr::col(target.meta().column(foreign)).eq(value));
            }
        }

        if self.kind.is_many() {
            let models = target.fetch(Some(query), RowLimit::Unlimited)?;
            tracing::debug!(count = models.len(), "Loaded related models");
            Ok(Related::Many(models))
        } else if target.read(Some(query))? {
            Ok(Related::One(Some(Box::new(target))))
        } else {
            Ok(Related::One(None))
        }
    }
}

/// A resolved relation value.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

impl Related {
    /// The value of a relation with no match.
    pub fn empty(kind: RelationKind) -> Self {
        if kind.is_many() {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Related::One(one) => one.is_none(),
            Related::Many(many) => many.is_empty(),
        }
    }

    pub fn as_one(&self) -> Option<&Model> {
        match self {
            Related::One(one) => one.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Model] {
        match self {
            Related::Many(many) => many,
            Related::One(_) => &[],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(model)) => model.as_json(),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(models) => {
                serde_json::Value::Array(models.iter().map(Model::as_json).collect())
            }
        }
    }
}

impl From<Model> for Related {
    fn from(model: Model) -> Self {
        Related::One(Some(Box::new(model)))
    }
}

impl From<Option<Model>> for Related {
    fn from(model: Option<Model>) -> Self {
        Related::One(model.map(Box::new))
    }
}

impl From<Vec<Model>> for Related {
    fn from(models: Vec<Model>) -> Self {
        Related::Many(models)
    }
}
