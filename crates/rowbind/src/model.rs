//! Entity instances: attribute access, lifecycle state and persistence.
//!
//! A [`Model`] binds one Storage to its type's [`Meta`]. Reads of a model
//! that identifies a row but has not fetched it yet load the row on first
//! access. Writes are normalized, passed through the field's on-change hook
//! and change-tracked; persistence operations turn the tracked state into
//! query descriptions and execute them on the model's connection.
//!
//! # Lifecycle
//!
//! | Flag        | Meaning                                           |
//! |-------------|---------------------------------------------------|
//! | initialized | construction finished                             |
//! | prepared    | enough identifying data to look the row up        |
//! | loading     | being populated from a row; hooks are suppressed  |
//! | loaded      | attributes are in sync with a persisted row       |
//! | deleted     | the backing row was removed                       |
//!
//! Setting `loaded` compacts the Storage, clears `loading` and sets
//! `prepared`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use rowbind_core::{
    AttributeErrorKind, Change, Connection, Error, Result, Row, Storage, UnscopedErrorKind,
    Validation, ValidationRequest, Validator, Value,
};
use rowbind_query::{Delete, Expr, Insert, Select, Update};

use crate::field::Field;
use crate::meta::{AttributeKind, Meta};
use crate::registry::Registry;
use crate::relation::Related;

/// Record-count limit of a persistence operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLimit {
    /// This single model.
    #[default]
    One,
    /// At most this many rows.
    Count(u64),
    /// Every matching row.
    Unlimited,
}

impl RowLimit {
    fn as_limit(self) -> Option<u64> {
        match self {
            RowLimit::One => Some(1),
            RowLimit::Count(n) => Some(n),
            RowLimit::Unlimited => None,
        }
    }
}

/// Lifecycle flags. They combine; see the module docs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State {
    pub initialized: bool,
    pub prepared: bool,
    pub loading: bool,
    pub loaded: bool,
    pub deleted: bool,
}

/// The value of a named attribute.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// A field or alias value.
    Value(Value),
    /// A resolved relation.
    Related(Related),
}

impl Attribute {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Attribute::Value(v) => Some(v),
            Attribute::Related(_) => None,
        }
    }
}

/// An entity instance.
#[derive(Clone)]
pub struct Model {
    meta: Arc<Meta>,
    registry: Arc<Registry>,
    conn: Arc<dyn Connection>,
    state: State,
    storage: Storage,
    related: HashMap<String, Related>,
    info: HashMap<String, Value>,
}

impl Model {
    /// Create a model with every field at its normalized default.
    ///
    /// The model is neither prepared nor loaded and reports no changes.
    pub fn new(
        registry: &Arc<Registry>,
        type_name: &str,
        conn: Arc<dyn Connection>,
    ) -> Result<Self> {
        let meta = registry.get(type_name)?;
        Ok(Self::with_meta(meta, Arc::clone(registry), conn))
    }

    fn with_meta(meta: Arc<Meta>, registry: Arc<Registry>, conn: Arc<dyn Connection>) -> Self {
        let mut storage = Storage::new();
        for field in meta.fields() {
            storage.set(field.name(), field.normalize(field.default_value().clone()));
        }
        storage.compact();

        Self {
            meta,
            registry,
            conn,
            state: State {
                initialized: true,
                ..State::default()
            },
            storage,
            related: HashMap::new(),
            info: HashMap::new(),
        }
    }

    /// A fresh model of the same type sharing registry and connection.
    fn sibling(&self) -> Self {
        Self::with_meta(
            Arc::clone(&self.meta),
            Arc::clone(&self.registry),
            Arc::clone(&self.conn),
        )
    }

    /// Populate attributes from a fetched row and mark the model loaded.
    ///
    /// Columns are matched to fields by attribute name, then by mapped
    /// column name. Unmatched columns are ignored. Hooks do not run.
    pub fn populate_from(&mut self, row: &Row) {
        let meta = Arc::clone(&self.meta);
        self.state.loading = true;
        for (column, value) in row.iter() {
            match meta.field_for_column(column) {
                Some(field) => self.write_field(field, value.clone()),
                None => tracing::trace!(column = %column, "Ignoring unmapped column"),
            }
        }
        self.set_loaded(true);
    }

    // ==================== Accessors ====================

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn type_name(&self) -> &str {
        self.meta.type_name()
    }

    pub fn state(&self) -> State {
        self.state
    }

    // ==================== Lifecycle ====================

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn is_prepared(&self) -> bool {
        self.state.prepared
    }

    pub fn set_prepared(&mut self, prepared: bool) {
        self.state.prepared = prepared;
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.state.loading = loading;
    }

    pub fn is_loaded(&self) -> bool {
        self.state.loaded
    }

    /// Setting `true` makes the current values the new originals.
    pub fn set_loaded(&mut self, loaded: bool) {
        self.state.loaded = loaded;
        if loaded {
            self.storage.compact();
            self.state.loading = false;
            self.state.prepared = true;
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.state.deleted = deleted;
    }

    /// Load the row now if the model identifies one it has not fetched.
    fn ensure_loaded(&mut self) -> Result<()> {
        let s = self.state;
        if s.prepared && !s.loaded && !s.loading && !s.deleted {
            tracing::debug!(model = %self.meta.type_name(), "Loading on first access");
            self.read(None)?;
        }
        Ok(())
    }

    // ==================== Attribute access ====================

    fn undefined(&self, name: &str) -> Error {
        Error::attribute(AttributeErrorKind::Undefined, self.meta.type_name(), name)
    }

    /// Read any attribute: field, alias or relation.
    pub fn attribute(&mut self, name: &str) -> Result<Attribute> {
        let meta = Arc::clone(&self.meta);
        match meta.resolve(name) {
            Some(AttributeKind::Alias(alias)) => alias.compute(self).map(Attribute::Value),
            Some(AttributeKind::Relation(_)) => self.related(name).cloned().map(Attribute::Related),
            Some(AttributeKind::Field(_)) => {
                self.ensure_loaded()?;
                Ok(Attribute::Value(self.current(name)))
            }
            None => Err(self.undefined(name)),
        }
    }

    /// Read a field or alias value.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        let meta = Arc::clone(&self.meta);
        match meta.resolve(name) {
            Some(AttributeKind::Relation(_)) => Err(Error::attribute(
                AttributeErrorKind::NotAValue,
                meta.type_name(),
                name,
            )),
            Some(_) => self
                .attribute(name)
                .map(|a| a.into_value().unwrap_or(Value::Null)),
            None => Err(self.undefined(name)),
        }
    }

    /// The stored value of a field, without loading.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.storage.get(name)
    }

    fn current(&self, name: &str) -> Value {
        self.storage.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Write a field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let meta = Arc::clone(&self.meta);
        match meta.resolve(name) {
            Some(AttributeKind::Field(field)) => {
                self.write_field(field, value.into());
                Ok(())
            }
            Some(AttributeKind::Alias(_)) => Err(Error::attribute(
                AttributeErrorKind::ReadOnly,
                meta.type_name(),
                name,
            )),
            Some(AttributeKind::Relation(_)) => Err(Error::attribute(
                AttributeErrorKind::NotAValue,
                meta.type_name(),
                name,
            )),
            None => Err(self.undefined(name)),
        }
    }

    fn write_field(&mut self, field: &Field, raw: Value) {
        let mut value = field.normalize(raw);
        if !self.state.loading {
            if let Some(hook) = field.on_change_hook() {
                tracing::trace!(field = %field.name(), hook = hook.name(), "Applying on-change hook");
                value = hook.apply(self, value);
            }
        }

        let changed = self.storage.set(field.name(), value);
        if changed && field.is_unique() && self.storage.is_changed(field.name()) {
            self.state.prepared = true;
        }
    }

    /// Write several fields, stopping at the first error.
    pub fn values<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in values {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Reset a field to its default, or forget a loaded relation.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let meta = Arc::clone(&self.meta);
        match meta.resolve(name) {
            Some(AttributeKind::Field(field)) => {
                self.write_field(field, field.default_value().clone());
                Ok(())
            }
            Some(AttributeKind::Relation(_)) => {
                self.related.remove(name);
                Ok(())
            }
            Some(AttributeKind::Alias(_)) => Err(Error::attribute(
                AttributeErrorKind::ReadOnly,
                meta.type_name(),
                name,
            )),
            None => Err(self.undefined(name)),
        }
    }

    /// Whether an attribute currently holds something.
    ///
    /// Fields must be non-null, relations must be resolved. Aliases always
    /// count as set. Nothing is loaded.
    pub fn has(&self, name: &str) -> bool {
        match self.meta.resolve(name) {
            Some(AttributeKind::Field(_)) => self.peek(name).is_some_and(|v| !v.is_null()),
            Some(AttributeKind::Relation(_)) => self.related.contains_key(name),
            Some(AttributeKind::Alias(_)) => true,
            None => false,
        }
    }

    /// Resolve a relation, loading it on first access.
    pub fn related(&mut self, name: &str) -> Result<&Related> {
        if !self.related.contains_key(name) {
            let meta = Arc::clone(&self.meta);
            let relation = meta.relation(name).ok_or_else(|| self.undefined(name))?;
            let value = relation.read(self)?;
            self.related.insert(name.to_string(), value);
        }
        self.related.get(name).ok_or_else(|| self.undefined(name))
    }

    /// Assign a relation.
    ///
    /// For a single related model each `using` pair copies the related
    /// model's attribute into the local one through [`Model::set`].
    pub fn set_related(&mut self, name: &str, value: impl Into<Related>) -> Result<()> {
        let meta = Arc::clone(&self.meta);
        let relation = meta.relation(name).ok_or_else(|| self.undefined(name))?;
        let mut value = value.into();

        if let Related::One(Some(other)) = &mut value {
            for (local, foreign) in relation.pairs() {
                let v = other.get(foreign)?;
                self.set(local, v)?;
            }
        }

        self.related.insert(name.to_string(), value);
        Ok(())
    }

    // ==================== Change tracking ====================

    pub fn changed(&self) -> BTreeMap<String, Change> {
        self.storage.changed()
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.storage.is_changed(name)
    }

    /// Forget resolved relations so they load again on next access.
    pub fn reset(&mut self) {
        self.related.clear();
    }

    // ==================== Side channel ====================

    pub fn info(&self, key: &str) -> Option<&Value> {
        self.info.get(key)
    }

    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.info.insert(key.into(), value.into());
    }

    pub fn take_info(&mut self, key: &str) -> Option<Value> {
        self.info.remove(key)
    }

    // ==================== Serialization ====================

    /// Current field values in declaration order. Nothing is loaded.
    pub fn as_map(&self) -> Row {
        Row::from_pairs(
            self.meta
                .fields()
                .iter()
                .map(|f| (f.name().to_string(), self.current(f.name()))),
        )
    }

    /// Field values plus resolved relations as a JSON object.
    pub fn as_json(&self) -> serde_json::Value {
        let mut json = self.as_map().to_json();
        if let serde_json::Value::Object(map) = &mut json {
            for (name, related) in &self.related {
                map.insert(name.clone(), related.to_json());
            }
        }
        json
    }

    // ==================== Validation ====================

    /// Check the current values with a validator.
    ///
    /// Errors are reported in the returned [`Validation`], never as `Err`.
    pub fn validate(&self, context: Option<&str>, validator: &dyn Validator) -> Validation {
        validator.validate(ValidationRequest {
            model: self.meta.type_name(),
            context,
            bindings: self.meta.validation(),
            data: self.as_map(),
        })
    }

    // ==================== Query descriptions ====================

    fn condition(&self, field: &Field, value: Value) -> Expr {
        Expr::col(self.meta.column(field.name())).eq(value)
    }

    /// Conditions identifying this model from the attributes set on it.
    ///
    /// Changed fields match their current value; otherwise unique fields
    /// holding a non-empty value match it.
    pub fn query_conditions(&self) -> Vec<Expr> {
        self.meta
            .fields()
            .iter()
            .filter_map(|field| {
                let value = self.current(field.name());
                if self.storage.is_changed(field.name())
                    || (field.is_unique() && !value.is_empty())
                {
                    Some(self.condition(field, value))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Conditions identifying the persisted row, never the pending values.
    ///
    /// Unique fields match their original value. Without any, unique fields
    /// holding a non-empty current value are used.
    pub fn identity_conditions(&self) -> Vec<Expr> {
        let unique = || self.meta.fields().iter().filter(|f| f.is_unique());

        let by_original: Vec<_> = unique()
            .filter_map(|field| {
                let original = self.storage.original(field.name())?;
                (!original.is_empty()).then(|| self.condition(field, original.clone()))
            })
            .collect();
        if !by_original.is_empty() {
            return by_original;
        }

        unique()
            .filter_map(|field| {
                let value = self.current(field.name());
                (!value.is_empty()).then(|| self.condition(field, value))
            })
            .collect()
    }

    /// SELECT of this model's fields scoped by [`Model::query_conditions`].
    ///
    /// A caller query keeps its own table, projection, filters and order.
    pub fn query_select(&self, query: Option<Select>) -> Select {
        let mut select = query.unwrap_or_default().table_or(self.meta.table());

        if !select.has_columns() {
            for field in self.meta.fields() {
                let column = self.meta.column(field.name());
                select = if column == field.name() {
                    select.column(column)
                } else {
                    select.column_as(column, field.name())
                };
            }
        }

        for condition in self.query_conditions() {
            select = select.filter(condition);
        }

        if !select.has_order() {
            for order in self.meta.order_by() {
                select = select.order_by(order);
            }
        }

        select
    }

    /// INSERT of every non-identity field by column.
    pub fn query_insert(&self, query: Option<Insert>) -> Insert {
        let insert = query.unwrap_or_default().table_or(self.meta.table());
        self.meta
            .fields()
            .iter()
            .filter(|f| !f.is_identity())
            .fold(insert, |insert, field| {
                insert.value(self.meta.column(field.name()), self.current(field.name()))
            })
    }

    /// UPDATE of the changed fields, scoped by [`Model::identity_conditions`].
    pub fn query_update(&self, query: Option<Update>) -> Update {
        let mut update = query.unwrap_or_default().table_or(self.meta.table());
        for (name, change) in self.storage.changed() {
            update = update.set(self.meta.column(&name), change.current);
        }
        for condition in self.identity_conditions() {
            update = update.filter(condition);
        }
        update
    }

    /// DELETE of this model's row, scoped by [`Model::identity_conditions`].
    ///
    /// Non-unique attributes never widen or narrow the match; use
    /// [`Model::delete_all`] to delete by arbitrary attributes.
    pub fn query_delete(&self, query: Option<Delete>) -> Delete {
        self.identity_conditions()
            .into_iter()
            .fold(query.unwrap_or_default().table_or(self.meta.table()), Delete::filter)
    }

    // ==================== Persistence ====================

    fn stamp(&mut self, on_create: bool) {
        let meta = Arc::clone(&self.meta);
        let now = Value::now();
        for field in meta.fields() {
            let behavior = field.timestamp_behavior();
            if (on_create && behavior.on_create()) || (!on_create && behavior.on_update()) {
                self.write_field(field, now.clone());
            }
        }
    }

    fn refuse_unscoped(&self, kind: UnscopedErrorKind) -> Error {
        Error::unscoped(kind, self.meta.type_name())
    }

    /// INSERT this model and take the generated identity.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn create(&mut self, query: Option<Insert>) -> Result<()> {
        self.stamp(true);

        let id = self.query_insert(query).execute(self.conn.as_ref())?;

        let meta = Arc::clone(&self.meta);
        let identities: Vec<&Field> = meta.identity_fields().collect();
        if let [identity] = identities.as_slice() {
            self.state.loading = true;
            self.write_field(identity, Value::Int(id));
        }
        self.set_loaded(true);
        tracing::debug!(id, "Created row");
        Ok(())
    }

    /// Fetch this model's row.
    ///
    /// Returns whether a row was found. When none is, the model is no
    /// longer prepared.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn read(&mut self, query: Option<Select>) -> Result<bool> {
        let row = self.query_select(query).first(self.conn.as_ref())?;
        match row {
            Some(row) => {
                self.populate_from(&row);
                tracing::debug!("Loaded row");
                Ok(true)
            }
            None => {
                self.state.prepared = false;
                self.state.loaded = false;
                tracing::debug!("No matching row");
                Ok(false)
            }
        }
    }

    /// Fetch matching rows without touching this model.
    pub fn read_all(&self, query: Option<Select>, limit: RowLimit) -> Result<Vec<Row>> {
        let mut select = self.query_select(query);
        if let Some(n) = limit.as_limit() {
            select = select.limit(n);
        }
        let rows = select.all(self.conn.as_ref())?;
        tracing::debug!(model = %self.meta.type_name(), rows = rows.len(), "Read rows");
        Ok(rows)
    }

    /// Fetch matching rows as loaded models of this type.
    pub fn fetch(&self, query: Option<Select>, limit: RowLimit) -> Result<Vec<Model>> {
        let rows = self.read_all(query, limit)?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut model = self.sibling();
                model.populate_from(row);
                model
            })
            .collect())
    }

    /// UPDATE the changed fields of this model's row.
    ///
    /// Returns `false` without touching the database when nothing changed.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn update(&mut self, query: Option<Update>) -> Result<bool> {
        if !self.storage.has_changes() {
            tracing::debug!("Nothing changed, skipping update");
            return Ok(false);
        }
        self.stamp(false);

        let update = self.query_update(query).limit(1);
        if !update.has_filter() {
            return Err(self.refuse_unscoped(UnscopedErrorKind::Update));
        }
        let affected = update.execute(self.conn.as_ref())?;
        self.set_loaded(true);
        tracing::debug!(affected, "Updated row");
        Ok(true)
    }

    /// UPDATE every row matched by the query with this model's changes.
    ///
    /// The model's own state is left as is apart from timestamp stamping.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn update_all(&mut self, query: Option<Update>, limit: RowLimit) -> Result<u64> {
        self.stamp(false);

        let mut update = self.query_update(query);
        if !update.has_sets() {
            return Ok(0);
        }
        if let Some(n) = limit.as_limit() {
            update = update.limit(n);
        }
        let affected = update.execute(self.conn.as_ref())?;
        tracing::debug!(affected, "Updated rows");
        Ok(affected)
    }

    /// DELETE this model's row. Attribute values stay readable.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn delete(&mut self, query: Option<Delete>) -> Result<bool> {
        let delete = self.query_delete(query).limit(1);
        if !delete.has_filter() {
            return Err(self.refuse_unscoped(UnscopedErrorKind::Delete));
        }
        let affected = delete.execute(self.conn.as_ref())?;
        self.state.deleted = true;
        tracing::debug!(affected, "Deleted row");
        Ok(affected > 0)
    }

    /// DELETE every row matched by the query and this model's conditions.
    #[tracing::instrument(level = "debug", skip(self, query), fields(model = %self.meta.type_name()))]
    pub fn delete_all(&self, query: Option<Delete>, limit: RowLimit) -> Result<u64> {
        let mut delete = self
            .query_conditions()
            .into_iter()
            .fold(query.unwrap_or_default().table_or(self.meta.table()), Delete::filter);
        if let Some(n) = limit.as_limit() {
            delete = delete.limit(n);
        }
        let affected = delete.execute(self.conn.as_ref())?;
        tracing::debug!(affected, "Deleted rows");
        Ok(affected)
    }

    /// Update a loaded model, create any other.
    pub fn save(&mut self) -> Result<()> {
        if self.state.loaded {
            self.update(None).map(|_| ())
        } else {
            self.create(None)
        }
    }

    /// Count the rows [`Model::query_select`] would return.
    pub fn total(&self, query: Option<Select>) -> Result<u64> {
        let counted = Select::new()
            .from_subquery(self.query_select(query), "t")
            .expr_as(Expr::count_star(), "total");
        let rows = counted.all(self.conn.as_ref())?;
        match rows.first() {
            Some(row) => row.get_named::<u64>("total"),
            None => Ok(0),
        }
    }

    /// Map one field's value to another's over the matching rows, in the
    /// default sort order.
    ///
    /// Each key appears once, at the position it was first seen, holding
    /// the value of the last row that had it.
    pub fn select_list(
        &self,
        key: &str,
        value: &str,
        query: Option<Select>,
    ) -> Result<Vec<(Value, Value)>> {
        let mut select = query.unwrap_or_default();
        for name in [key, value] {
            if self.meta.field(name).is_none() {
                return Err(self.undefined(name));
            }
            let column = self.meta.column(name);
            select = if column == name {
                select.column(column)
            } else {
                select.column_as(column, name)
            };
        }

        let rows = self.query_select(Some(select)).all(self.conn.as_ref())?;
        let mut list: Vec<(Value, Value)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let k = row.get_by_name(key).cloned().unwrap_or(Value::Null);
            let v = row.get_by_name(value).cloned().unwrap_or(Value::Null);
            match list.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => list.push((k, v)),
            }
        }
        Ok(list)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.meta.type_name())
            .field("state", &self.state)
            .field("values", &self.as_map())
            .field("related", &self.related.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
