//! Per-type schema metadata.
//!
//! A [`Schema`] describes an entity type by filling in a [`MetaBuilder`].
//! The registry runs the schema's `build` step, then its `finish` step, then
//! the built-in fix-ups in [`MetaBuilder::finish`], and only then publishes
//! the immutable [`Meta`].

use std::collections::HashMap;
use std::fmt;

use rowbind_core::{Callback, Filter, Result, Rule, ValidationBindings, Value};
use rowbind_query::{Expr, OrderBy, OrderDirection};

use crate::field::Field;
use crate::model::Model;
use crate::relation::Relation;

/// Computes a read-only attribute from the model.
pub type AliasFn = fn(&mut Model) -> Result<Value>;

/// A computed attribute.
#[derive(Clone)]
pub struct Alias {
    name: String,
    compute: AliasFn,
}

impl Alias {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compute(&self, model: &mut Model) -> Result<Value> {
        (self.compute)(model)
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alias").field("name", &self.name).finish()
    }
}

/// The kind of a named attribute, as resolved from the schema.
#[derive(Debug, Clone, Copy)]
pub enum AttributeKind<'a> {
    Field(&'a Field),
    Alias(&'a Alias),
    Relation(&'a Relation),
}

/// Describes one entity type.
///
/// Implemented for any `Fn(&mut MetaBuilder)`, so most schemas are plain
/// functions or closures.
pub trait Schema: Send + Sync {
    /// Populate the descriptor.
    fn build(&self, meta: &mut MetaBuilder);

    /// Cross-field fix-ups, run after `build`.
    fn finish(&self, _meta: &mut MetaBuilder) {}
}

impl<F> Schema for F
where
    F: Fn(&mut MetaBuilder) + Send + Sync,
{
    fn build(&self, meta: &mut MetaBuilder) {
        self(meta);
    }
}

/// Mutable descriptor handed to [`Schema::build`] and [`Schema::finish`].
#[derive(Debug)]
pub struct MetaBuilder {
    type_name: String,
    table: Option<String>,
    fields: Vec<Field>,
    relations: Vec<Relation>,
    aliases: Vec<Alias>,
    columns: HashMap<String, String>,
    sorting: Vec<(String, OrderDirection)>,
    validation: ValidationBindings,
}

impl MetaBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            fields: Vec::new(),
            relations: Vec::new(),
            aliases: Vec::new(),
            columns: HashMap::new(),
            sorting: Vec::new(),
            validation: ValidationBindings::default(),
        }
    }

    /// Normalized identifier of the type being built.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set the backing table. Defaults to the type name.
    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Add a field. Redefining a field replaces it in place.
    pub fn field(&mut self, field: Field) -> &mut Self {
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Add a relation. Redefining a relation replaces it in place.
    pub fn relation(&mut self, relation: Relation) -> &mut Self {
        match self.relations.iter_mut().find(|r| r.name() == relation.name()) {
            Some(slot) => *slot = relation,
            None => self.relations.push(relation),
        }
        self
    }

    /// Add a computed, read-only attribute.
    pub fn alias(&mut self, name: impl Into<String>, compute: AliasFn) -> &mut Self {
        let name = name.into();
        self.aliases.retain(|a| a.name != name);
        self.aliases.push(Alias { name, compute });
        self
    }

    /// Map an attribute to a differently named column.
    pub fn column(&mut self, attribute: impl Into<String>, column: impl Into<String>) -> &mut Self {
        self.columns.insert(attribute.into(), column.into());
        self
    }

    /// Append a default sort key.
    pub fn sort(&mut self, attribute: impl Into<String>, direction: OrderDirection) -> &mut Self {
        let attribute = attribute.into();
        self.sorting.retain(|(a, _)| *a != attribute);
        self.sorting.push((attribute, direction));
        self
    }

    pub fn label(&mut self, attribute: impl Into<String>, label: impl Into<String>) -> &mut Self {
        self.validation.labels.insert(attribute.into(), label.into());
        self
    }

    pub fn filter(&mut self, attribute: impl Into<String>, filter: Filter) -> &mut Self {
        self.validation
            .filters
            .entry(attribute.into())
            .or_default()
            .push(filter);
        self
    }

    pub fn rule(&mut self, attribute: impl Into<String>, rule: Rule) -> &mut Self {
        self.validation
            .rules
            .entry(attribute.into())
            .or_default()
            .push(rule);
        self
    }

    pub fn callback(&mut self, attribute: impl Into<String>, callback: Callback) -> &mut Self {
        self.validation
            .callbacks
            .entry(attribute.into())
            .or_default()
            .push(callback);
        self
    }

    /// Name a validation context and the attributes it checks.
    pub fn validate(&mut self, context: impl Into<String>, attributes: &[&str]) -> &mut Self {
        self.validation.contexts.insert(
            context.into(),
            attributes.iter().map(|&a| a.to_string()).collect(),
        );
        self
    }

    /// Apply the built-in fix-ups and freeze the descriptor.
    pub fn finish(mut self) -> Meta {
        let table = self.table.take().unwrap_or_else(|| self.type_name.clone());

        for field in &mut self.fields {
            if field.is_primary() && !field.is_unique() {
                field.set_unique(true);
            }
        }

        let field_index: HashMap<String, usize> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();

        let type_name = &self.type_name;
        self.sorting.retain(|(attribute, _)| {
            let known = field_index.contains_key(attribute);
            if !known {
                tracing::warn!(
                    model = %type_name,
                    attribute = %attribute,
                    "Dropping sort key for unknown field"
                );
            }
            known
        });

        for relation in &mut self.relations {
            let relation_name = relation.name().to_string();
            relation.retain_pairs(|(local, _)| {
                let known = field_index.contains_key(local);
                if !known {
                    tracing::warn!(
                        model = %type_name,
                        relation = %relation_name,
                        local = %local,
                        "Dropping relation key for unknown field"
                    );
                }
                known
            });
        }

        Meta {
            type_name: self.type_name,
            table,
            fields: self.fields,
            field_index,
            relations: self
                .relations
                .into_iter()
                .map(|r| (r.name().to_string(), r))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
            columns: self.columns,
            sorting: self.sorting,
            validation: self.validation,
        }
    }
}

/// Immutable schema descriptor of one entity type.
#[derive(Debug)]
pub struct Meta {
    type_name: String,
    table: String,
    fields: Vec<Field>,
    field_index: HashMap<String, usize>,
    relations: HashMap<String, Relation>,
    aliases: HashMap<String, Alias>,
    columns: HashMap<String, String>,
    sorting: Vec<(String, OrderDirection)>,
    validation: ValidationBindings,
}

impl Meta {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    /// Resolve an attribute name. Aliases shadow relations, which shadow
    /// fields.
    pub fn resolve(&self, name: &str) -> Option<AttributeKind<'_>> {
        if let Some(alias) = self.aliases.get(name) {
            return Some(AttributeKind::Alias(alias));
        }
        if let Some(relation) = self.relations.get(name) {
            return Some(AttributeKind::Relation(relation));
        }
        self.field(name).map(AttributeKind::Field)
    }

    /// Physical column of an attribute; the attribute name when unmapped.
    pub fn column<'a>(&'a self, name: &'a str) -> &'a str {
        self.columns.get(name).map_or(name, String::as_str)
    }

    /// The field stored in a physical column, if any.
    pub fn field_for_column(&self, column: &str) -> Option<&Field> {
        self.field(column).or_else(|| {
            self.columns
                .iter()
                .find(|(_, c)| *c == column)
                .and_then(|(attribute, _)| self.field(attribute))
        })
    }

    /// Default sort order as `(attribute, direction)` pairs.
    pub fn sorting(&self) -> &[(String, OrderDirection)] {
        &self.sorting
    }

    /// Default sort order as ORDER BY clauses over physical columns.
    pub fn order_by(&self) -> Vec<OrderBy> {
        self.sorting
            .iter()
            .map(|(attribute, direction)| OrderBy::new(Expr::col(self.column(attribute)), *direction))
            .collect()
    }

    pub fn validation(&self) -> &ValidationBindings {
        &self.validation
    }

    /// Fields whose value the database generates.
    pub fn identity_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(meta: &mut MetaBuilder) {
        meta.field(Field::auto("id").primary())
            .field(Field::string("name").default(""))
            .field(Field::string("email").unique())
            .column("email", "email_address")
            .sort("name", OrderDirection::Asc)
            .sort("nickname", OrderDirection::Desc)
            .relation(
                Relation::has_many("posts", "post")
                    .using("id", "author_id")
                    .using("ghost", "x"),
            )
            .alias("display", |m| m.get("name"));
    }

    fn finished() -> Meta {
        let mut builder = MetaBuilder::new("person");
        person(&mut builder);
        builder.finish()
    }

    #[test]
    fn table_defaults_to_type_name() {
        let meta = finished();
        assert_eq!(meta.table(), "person");

        let mut builder = MetaBuilder::new("person");
        builder.table("people");
        assert_eq!(builder.finish().table(), "people");
    }

    #[test]
    fn primary_implies_unique() {
        let meta = finished();
        assert!(meta.field("id").unwrap().is_unique());
        assert!(!meta.field("name").unwrap().is_unique());
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let meta = finished();
        assert_eq!(meta.sorting(), &[("name".to_string(), OrderDirection::Asc)]);
        let posts = meta.relation("posts").unwrap();
        assert_eq!(posts.pairs(), &[("id".to_string(), "author_id".to_string())]);
    }

    #[test]
    fn fields_keep_declaration_order() {
        let meta = finished();
        let names: Vec<_> = meta.fields().iter().map(Field::name).collect();
        assert_eq!(names, vec!["id", "name", "email"]);
    }

    #[test]
    fn redefining_a_field_replaces_it_in_place() {
        let mut builder = MetaBuilder::new("t");
        builder
            .field(Field::integer("a"))
            .field(Field::integer("b"))
            .field(Field::string("a"));
        let meta = builder.finish();
        assert_eq!(meta.fields().len(), 2);
        assert_eq!(meta.fields()[0].kind().name(), "string");
    }

    #[test]
    fn column_mapping() {
        let meta = finished();
        assert_eq!(meta.column("email"), "email_address");
        assert_eq!(meta.column("name"), "name");
        assert_eq!(meta.field_for_column("email_address").unwrap().name(), "email");
        assert_eq!(meta.field_for_column("name").unwrap().name(), "name");
        assert!(meta.field_for_column("missing").is_none());
    }

    #[test]
    fn resolve_dispatches_by_kind() {
        let meta = finished();
        assert!(matches!(meta.resolve("display"), Some(AttributeKind::Alias(_))));
        assert!(matches!(meta.resolve("posts"), Some(AttributeKind::Relation(_))));
        assert!(matches!(meta.resolve("name"), Some(AttributeKind::Field(_))));
        assert!(meta.resolve("nope").is_none());
    }

    #[test]
    fn schema_finish_runs_before_builtin_fixups() {
        struct Audited;

        impl Schema for Audited {
            fn build(&self, meta: &mut MetaBuilder) {
                meta.field(Field::string("code").primary());
            }

            fn finish(&self, meta: &mut MetaBuilder) {
                if meta.get_field("created").is_none() {
                    meta.field(Field::timestamp("created").auto_now_create());
                }
            }
        }

        let mut builder = MetaBuilder::new("audited");
        Audited.build(&mut builder);
        Audited.finish(&mut builder);
        let meta = builder.finish();
        assert!(meta.field("created").is_some());
        assert!(meta.field("code").unwrap().is_unique());
    }
}
