//! Schema registry with memoized, single-flight metadata construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use rowbind_core::{Connection, Error, Result, Row};

use crate::meta::{Meta, MetaBuilder, Schema};
use crate::model::Model;

/// Maps type identifiers to schemas and memoizes the built [`Meta`].
///
/// Identifiers are case-insensitive. Each type's metadata is built at most
/// once per registry, on first request; concurrent first requests wait for
/// the same build and observe the same instance.
///
/// A registry is an ordinary value. Tests build a fresh one each; an
/// application typically keeps one in an `Arc` for its whole lifetime.
pub struct Registry {
    schemas: RwLock<HashMap<String, Arc<dyn Schema>>>,
    metas: Mutex<HashMap<String, Arc<OnceLock<Arc<Meta>>>>>,
}

fn normalize(type_name: &str) -> String {
    type_name.trim().to_lowercase()
}

impl Registry {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            metas: Mutex::new(HashMap::new()),
        }
    }

    /// Register the schema for a type.
    ///
    /// Registering again replaces the schema, but metadata already built
    /// for the type stays in effect.
    pub fn register(&self, type_name: &str, schema: impl Schema + 'static) -> &Self {
        let key = normalize(type_name);
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        if schemas.insert(key.clone(), Arc::new(schema)).is_some() {
            tracing::debug!(model = %key, "Replaced schema registration");
        }
        self
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        schemas.contains_key(&normalize(type_name))
    }

    /// Get the metadata for a type, building it on first use.
    pub fn get(&self, type_name: &str) -> Result<Arc<Meta>> {
        let key = normalize(type_name);
        let schema = {
            let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
            schemas.get(&key).cloned()
        }
        .ok_or_else(|| Error::unconfigured(type_name))?;

        // The map lock is only held to find the cell; the build itself runs
        // under the cell's own initialization lock.
        let cell = {
            let mut metas = self.metas.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(metas.entry(key.clone()).or_default())
        };

        if let Some(meta) = cell.get() {
            tracing::trace!(model = %key, "Schema cache hit");
            return Ok(Arc::clone(meta));
        }

        let meta = cell.get_or_init(|| Arc::new(build(&key, schema.as_ref())));
        Ok(Arc::clone(meta))
    }

    /// Create an empty model of a type.
    pub fn model(self: &Arc<Self>, type_name: &str, conn: Arc<dyn Connection>) -> Result<Model> {
        Model::new(self, type_name, conn)
    }

    /// Create a model of a type populated from a fetched row.
    pub fn hydrate(
        self: &Arc<Self>,
        type_name: &str,
        conn: Arc<dyn Connection>,
        row: &Row,
    ) -> Result<Model> {
        let mut model = Model::new(self, type_name, conn)?;
        model.populate_from(row);
        Ok(model)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = schemas.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("schemas", &names).finish()
    }
}

fn build(key: &str, schema: &dyn Schema) -> Meta {
    let mut builder = MetaBuilder::new(key);
    schema.build(&mut builder);
    schema.finish(&mut builder);
    let meta = builder.finish();
    tracing::debug!(
        model = %key,
        table = %meta.table(),
        fields = meta.fields().len(),
        "Built schema metadata"
    );
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        builds: Arc<AtomicUsize>,
    }

    impl Schema for Counting {
        fn build(&self, meta: &mut MetaBuilder) {
            self.builds.fetch_add(1, Ordering::SeqCst);
            // Widen the race window for concurrent first access.
            std::thread::sleep(std::time::Duration::from_millis(20));
            meta.field(Field::auto("id").primary());
        }
    }

    #[test]
    fn get_is_memoized_and_case_insensitive() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        registry.register(
            "Person",
            Counting {
                builds: Arc::clone(&builds),
            },
        );

        let a = registry.get("person").unwrap();
        let b = registry.get("PERSON").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(a.type_name(), "person");
        assert!(registry.is_registered("pErSoN"));
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        registry.register(
            "person",
            Counting {
                builds: Arc::clone(&builds),
            },
        );

        let metas: Vec<Arc<Meta>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let registry = &registry;
                    s.spawn(move || {
                        let name = if i % 2 == 0 { "person" } else { "Person" };
                        registry.get(name).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(metas.iter().all(|m| Arc::ptr_eq(m, &metas[0])));
    }

    #[test]
    fn unconfigured_type_is_an_error() {
        let registry = Registry::new();
        let err = registry.get("ghost").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(ref s) if s.kind == rowbind_core::SchemaErrorKind::Unconfigured
        ));
        assert!(!registry.is_registered("ghost"));
    }

    #[test]
    fn closures_are_schemas() {
        let registry = Registry::new();
        registry
            .register("tag", |meta: &mut MetaBuilder| {
                meta.table("tags").field(Field::string("label").unique());
            })
            .register("note", |meta: &mut MetaBuilder| {
                meta.field(Field::string("body"));
            });
        assert_eq!(registry.get("tag").unwrap().table(), "tags");
        assert_eq!(registry.get("note").unwrap().table(), "note");
    }

    #[test]
    fn separate_registries_are_isolated() {
        let first = Registry::new();
        let second = Registry::new();
        first.register("person", |meta: &mut MetaBuilder| {
            meta.field(Field::auto("id"));
        });
        assert!(first.get("person").is_ok());
        assert!(second.get("person").is_err());
    }
}
