//! Module: db
//! Responsibility: the entity manager façade and everything it drives:
//! query descriptions, the engine boundary, plans and repositories.

pub mod config;
pub mod engine;
pub mod plan;
pub mod query;
pub mod repository;

#[cfg(test)]
mod tests;

use crate::{
    OrmError,
    cache::{CacheBackend, CacheKey, IdentityCache, MemoryCache},
    db::{
        config::{ConfigError, OrmConfig, RepositoryConfig},
        engine::{QueryEngine, QueryResult},
        plan::EntityPlan,
        query::Query,
        repository::{Lookup, Repository, RepositoryError},
    },
    entity::{
        Entity,
        access::{AccessorTable, EntityMethods},
    },
    model::DefinitionStore,
    obs::{MetricsEvent, MetricsSink, NoopSink, OperationKind},
    transform::{Transformer, TransformerRegistry},
    value::Value,
};
use std::{
    cell::{Ref, RefCell, RefMut},
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

///
/// ParamSource
///
/// Request-like parameter lookup used by `EntityManager::resolve`.
///

pub trait ParamSource {
    fn param(&self, name: &str) -> Option<Value>;
}

impl ParamSource for BTreeMap<String, Value> {
    fn param(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl<S: std::hash::BuildHasher> ParamSource for HashMap<String, Value, S> {
    fn param(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

///
/// CompiledEntity
/// Plan and accessor table, built once per entity type.
///

pub(crate) struct CompiledEntity {
    pub(crate) plan: EntityPlan,
    pub(crate) accessors: AccessorTable,
}

///
/// EntityManagerBuilder
///

pub struct EntityManagerBuilder {
    store: Arc<DefinitionStore>,
    engine: Box<dyn QueryEngine>,
    transformers: TransformerRegistry,
    cache: Arc<dyn CacheBackend>,
    identity: IdentityCache,
    config: OrmConfig,
    methods: BTreeMap<String, EntityMethods>,
    sink: Arc<dyn MetricsSink>,
}

impl EntityManagerBuilder {
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = cache;
        self
    }

    /// Identity cache of the first request.
    #[must_use]
    pub fn identity_cache(mut self, identity: IdentityCache) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn methods(mut self, entity: impl Into<String>, methods: EntityMethods) -> Self {
        self.methods.insert(entity.into(), methods);
        self
    }

    #[must_use]
    pub fn transformer<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformers.register(transformer);
        self
    }

    #[must_use]
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Compile every entity plan; definition defects surface here.
    pub fn build(self) -> Result<EntityManager, OrmError> {
        let mut compiled = BTreeMap::new();
        for definition in self.store.entities() {
            let plan = EntityPlan::build(&self.store, definition.name())?;
            let accessors = AccessorTable::build(definition, self.methods.get(definition.name()));

            tracing::debug!(
                entity = definition.name(),
                fingerprint = %plan.fingerprint(),
                "compiled entity plan"
            );
            compiled.insert(
                definition.name().to_string(),
                CompiledEntity { plan, accessors },
            );
        }

        Ok(EntityManager {
            store: self.store,
            transformers: self.transformers,
            cache: self.cache,
            identity: RefCell::new(self.identity),
            engine: RefCell::new(self.engine),
            config: self.config,
            methods: self.methods,
            sink: self.sink,
            compiled,
            journal: RefCell::new(None),
        })
    }
}

///
/// EntityManager
///
/// Owns definitions, transformers, the result cache, the identity cache of
/// the current request and the query engine; dispenses repositories.
///
/// Single-threaded: one manager serves one request at a time. Only the
/// result cache is shared between managers.
///

pub struct EntityManager {
    store: Arc<DefinitionStore>,
    transformers: TransformerRegistry,
    cache: Arc<dyn CacheBackend>,
    identity: RefCell<IdentityCache>,
    engine: RefCell<Box<dyn QueryEngine>>,
    config: OrmConfig,
    methods: BTreeMap<String, EntityMethods>,
    sink: Arc<dyn MetricsSink>,
    compiled: BTreeMap<String, CompiledEntity>,
    // result-cache keys written inside the open transaction
    journal: RefCell<Option<Vec<CacheKey>>>,
}

impl EntityManager {
    #[must_use]
    pub fn builder(
        store: impl Into<Arc<DefinitionStore>>,
        engine: impl QueryEngine + 'static,
    ) -> EntityManagerBuilder {
        EntityManagerBuilder {
            store: store.into(),
            engine: Box::new(engine),
            transformers: TransformerRegistry::with_defaults(),
            cache: Arc::new(MemoryCache::new()),
            identity: IdentityCache::new(),
            config: OrmConfig::default(),
            methods: BTreeMap::new(),
            sink: Arc::new(NoopSink),
        }
    }

    /// Builder over the definition document named by `config.definitions`.
    pub fn from_config(
        config: OrmConfig,
        engine: impl QueryEngine + 'static,
    ) -> Result<EntityManagerBuilder, OrmError> {
        let path = config
            .definitions
            .clone()
            .ok_or(ConfigError::MissingDefinitions)?;
        let store = DefinitionStore::from_path(path)?;

        Ok(Self::builder(store, engine).config(config))
    }

    ///
    /// REPOSITORIES
    ///

    /// Repository for `entity`. A definition naming a repository profile
    /// must find it registered.
    pub fn repository(&self, entity: &str) -> Result<Repository<'_>, OrmError> {
        let definition = self.store.definition(entity)?;
        let compiled = self
            .compiled
            .get(entity)
            .ok_or_else(|| RepositoryError::RepositoryNotFound {
                name: entity.to_string(),
            })?;

        let config = match definition.repository() {
            Some(profile) => self.config.profile(profile).ok_or_else(|| {
                RepositoryError::RepositoryNotFound {
                    name: profile.to_string(),
                }
            })?,
            None => &self.config.repository,
        };

        Ok(Repository::new(self, definition, compiled, config))
    }

    pub fn repository_for(&self, entity: &Entity) -> Result<Repository<'_>, OrmError> {
        self.repository(entity.name())
    }

    ///
    /// OPERATIONS
    ///

    /// Insert or update `entity` (and its dependent relations) in one
    /// transaction. Generated keys are written back into `entity`.
    pub fn persist(&self, entity: &mut Entity) -> Result<Entity, OrmError> {
        let name = entity.name().to_string();

        self.transaction(OperationKind::Persist, &name, || {
            self.repository(&name)?.persist(entity)
        })
    }

    pub fn delete(&self, entity: &Entity) -> Result<(), OrmError> {
        self.transaction(OperationKind::Delete, entity.name(), || {
            self.repository_for(entity)?.delete(entity)
        })
    }

    /// Reload `entity` from storage, bypassing both caches.
    pub fn refresh(&self, entity: &Entity) -> Result<Entity, OrmError> {
        self.repository_for(entity)?.refresh(entity)
    }

    /// Load `entity` by the key found under `name` in `source`.
    pub fn resolve(
        &self,
        entity: &str,
        source: &dyn ParamSource,
        name: &str,
    ) -> Result<Option<Entity>, OrmError> {
        let repository = self.repository(entity)?;
        match source.param(name) {
            Some(value) if !value.is_null() => repository.get(Lookup::from(value)),
            _ => Ok(None),
        }
    }

    /// Start a new request scope, returning the previous identity cache.
    pub fn begin_request(&self, identity: IdentityCache) -> IdentityCache {
        self.identity.replace(identity)
    }

    ///
    /// REGISTRATION
    ///

    pub fn register_transformer<T: Transformer + 'static>(&mut self, transformer: T) {
        self.transformers.register(transformer);
    }

    /// Bind getters/setters for a `methods`-access entity.
    pub fn register_methods(
        &mut self,
        entity: &str,
        methods: EntityMethods,
    ) -> Result<(), OrmError> {
        let definition = self.store.definition(entity)?;
        let accessors = AccessorTable::build(definition, Some(&methods));

        if let Some(compiled) = self.compiled.get_mut(entity) {
            compiled.accessors = accessors;
        }
        self.methods.insert(entity.to_string(), methods);

        Ok(())
    }

    /// Register a named repository profile.
    pub fn register_repository(&mut self, name: impl Into<String>, config: RepositoryConfig) {
        self.config.repositories.insert(name.into(), config);
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn definitions(&self) -> &DefinitionStore {
        &self.store
    }

    #[must_use]
    pub const fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    #[must_use]
    pub fn result_cache(&self) -> &dyn CacheBackend {
        self.cache.as_ref()
    }

    #[must_use]
    pub fn identity_cache(&self) -> Ref<'_, IdentityCache> {
        self.identity.borrow()
    }

    #[must_use]
    pub const fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// Compiled plan of `entity`.
    pub fn plan(&self, entity: &str) -> Result<&EntityPlan, OrmError> {
        self.store.definition(entity)?;

        self.compiled
            .get(entity)
            .map(|compiled| &compiled.plan)
            .ok_or_else(|| {
                RepositoryError::RepositoryNotFound {
                    name: entity.to_string(),
                }
                .into()
            })
    }

    ///
    /// INTERNAL
    ///

    pub(crate) fn identity_mut(&self) -> RefMut<'_, IdentityCache> {
        self.identity.borrow_mut()
    }

    pub(crate) fn record(&self, event: MetricsEvent<'_>) {
        self.sink.record(event);
    }

    pub(crate) fn execute(&self, query: &Query) -> Result<QueryResult, OrmError> {
        tracing::debug!(statement = %query, "execute");
        self.sink.record(MetricsEvent::Statement {
            kind: query.kind(),
            table: query.table(),
        });

        Ok(self.engine.borrow_mut().execute(query)?)
    }

    /// Store in the result cache, journaling the key inside a transaction.
    pub(crate) fn cache_result(&self, key: &CacheKey, entity: &Entity) {
        self.cache.cache(key, entity);
        if let Some(journal) = self.journal.borrow_mut().as_mut() {
            journal.push(key.clone());
        }
    }

    /// Evict `key` from both caches.
    pub(crate) fn invalidate(&self, key: &CacheKey) {
        tracing::trace!(%key, "invalidate");
        self.identity.borrow_mut().invalidate(key);
        self.cache.invalidate(key);
        self.sink.record(MetricsEvent::Invalidated {
            entity: key.entity(),
        });
    }

    fn transaction<R>(
        &self,
        kind: OperationKind,
        entity: &str,
        body: impl FnOnce() -> Result<R, OrmError>,
    ) -> Result<R, OrmError> {
        self.engine.borrow_mut().begin()?;
        *self.journal.borrow_mut() = Some(Vec::new());
        tracing::debug!(entity, ?kind, "begin transaction");

        let result = body().and_then(|value| {
            self.engine.borrow_mut().commit()?;
            Ok(value)
        });
        let journal = self.journal.borrow_mut().take().unwrap_or_default();

        match result {
            Ok(value) => {
                tracing::debug!(entity, ?kind, "commit");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(entity, ?kind, error = %err, "rolling back");
                if let Err(rollback) = self.engine.borrow_mut().rollback() {
                    tracing::warn!(entity, error = %rollback, "rollback failed");
                }

                // cached reads may reflect the discarded writes
                self.identity.borrow_mut().clear();
                for key in &journal {
                    self.cache.invalidate(key);
                }
                self.sink.record(MetricsEvent::Rollback { kind, entity });

                Err(err)
            }
        }
    }
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("entities", &self.compiled.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
