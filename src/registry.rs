//! The preparer registry and the context-relation loader.
//!
//! The registry is the process-wide mapping from model name to preparer,
//! validated against the catalog at registration time and instantiated
//! lazily (at most once) on first use. It also hosts the loader:
//! [`Registry::load_on_context`] decides whether a relation was requested,
//! and when it was, installs the eager load (or count) on the context with a
//! hook that prepares the relation subquery at the right namespace.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::error::{PrepareError, PrepareResult};
use crate::namespace;
use crate::options::OptionSource;
use crate::preparer::Preparer;
use crate::query::{Context, Query};

type PreparerFactory<Q> = Arc<dyn Fn() -> Preparer<Q> + Send + Sync>;

enum Slot<Q: Query> {
    Ready(Arc<Preparer<Q>>),
    Deferred(PreparerFactory<Q>),
}

/// Everything a single preparation pass needs: the registry (for nested
/// relation loads and the depth guard) and the request-scoped option source.
/// Built by the registry; extend hooks receive it and use [`PrepareRun::load`]
/// to attach deeper relations.
pub struct PrepareRun<'a, Q: Query> {
    registry: &'a Arc<Registry<Q>>,
    options: &'a Arc<dyn OptionSource>,
}

impl<'a, Q: Query + 'static> PrepareRun<'a, Q> {
    pub(crate) fn new(registry: &'a Arc<Registry<Q>>, options: &'a Arc<dyn OptionSource>) -> Self {
        Self { registry, options }
    }

    /// The registry driving this run.
    pub fn registry(&self) -> &Arc<Registry<Q>> {
        self.registry
    }

    /// The request-scoped option source.
    pub fn options(&self) -> &Arc<dyn OptionSource> {
        self.options
    }

    /// The nesting ceiling for this run.
    pub fn max_depth(&self) -> usize {
        self.registry.max_depth()
    }

    /// Attach a related model onto a context if the request asked for it.
    /// Shorthand for [`Registry::load_on_context`] within an extend hook.
    pub fn load<C: Context<Query = Q>>(
        &self,
        model: &str,
        context: &mut C,
        namespace: &str,
        info_key: Option<&str>,
    ) -> PrepareResult<()> {
        self.registry
            .load_on_context(model, self.options, context, namespace, info_key, false)
    }

    /// Attach a relation count onto a context if the request asked for it.
    pub fn load_count<C: Context<Query = Q>>(
        &self,
        model: &str,
        context: &mut C,
        namespace: &str,
        info_key: Option<&str>,
    ) -> PrepareResult<()> {
        self.registry
            .load_on_context(model, self.options, context, namespace, info_key, true)
    }
}

/// Process-wide registry of model preparers.
///
/// Shared behind an `Arc` across requests; preparers are stateless with
/// respect to request data, so one instance per model per process suffices.
pub struct Registry<Q: Query> {
    catalog: Catalog,
    max_depth: usize,
    slots: RwLock<HashMap<String, Slot<Q>>>,
}

impl<Q: Query + 'static> Registry<Q> {
    /// Create a registry over a catalog of known models.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            max_depth: namespace::DEFAULT_MAX_DEPTH,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Override the include-tree nesting ceiling.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The include-tree nesting ceiling.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The catalog this registry validates against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Register a preparer instance for a model. Re-registering a model
    /// silently overwrites the previous association.
    pub fn register(&self, model: &str, preparer: Preparer<Q>) -> PrepareResult<()> {
        self.check_model(model)?;
        self.check_preparer(model, &preparer)?;
        self.slots
            .write()
            .insert(model.to_string(), Slot::Ready(Arc::new(preparer)));
        Ok(())
    }

    /// Register a deferred preparer for a model; the factory runs at most
    /// once, on first resolution.
    pub fn register_with(
        &self,
        model: &str,
        factory: impl Fn() -> Preparer<Q> + Send + Sync + 'static,
    ) -> PrepareResult<()> {
        self.check_model(model)?;
        self.slots
            .write()
            .insert(model.to_string(), Slot::Deferred(Arc::new(factory)));
        Ok(())
    }

    /// Resolve the preparer for a model, instantiating a deferred
    /// registration on first use.
    pub fn resolve(&self, model: &str) -> PrepareResult<Arc<Preparer<Q>>> {
        {
            let slots = self.slots.read();
            match slots.get(model) {
                Some(Slot::Ready(preparer)) => return Ok(Arc::clone(preparer)),
                Some(Slot::Deferred(_)) => {}
                None => return Err(PrepareError::UnregisteredModel(model.to_string())),
            }
        }

        let mut slots = self.slots.write();
        // Re-check: another caller may have instantiated while we waited.
        let factory = match slots.get(model) {
            Some(Slot::Ready(preparer)) => return Ok(Arc::clone(preparer)),
            Some(Slot::Deferred(factory)) => Arc::clone(factory),
            None => return Err(PrepareError::UnregisteredModel(model.to_string())),
        };

        let preparer = factory();
        self.check_preparer(model, &preparer)?;
        let preparer = Arc::new(preparer);
        slots.insert(model.to_string(), Slot::Ready(Arc::clone(&preparer)));
        debug!(model, "instantiated deferred preparer");
        Ok(preparer)
    }

    /// Prepare a query for a model at the request root. When `query` is
    /// omitted, a fresh query over the model's table is the starting point.
    pub fn prepare(
        self: &Arc<Self>,
        model: &str,
        options: &Arc<dyn OptionSource>,
        query: Option<Q>,
    ) -> PrepareResult<Q> {
        let preparer = self.resolve(model)?;
        let mut query =
            query.unwrap_or_else(|| Q::new_for(preparer.table(), preparer.model()));
        let run = PrepareRun::new(self, options);
        preparer.prepare(&run, &mut query, None, "", None)?;
        Ok(query)
    }

    /// Attach a related model onto a context when the request asked for it.
    ///
    /// Consults the option source to decide inclusion (raw and snake-cased
    /// path spellings both count), pre-selects the descriptor's foreign key,
    /// and either installs a count (native on pending queries, computed
    /// directly on live entities) or an eager load whose hook prepares the
    /// relation subquery with the same namespace prefix and info key, so
    /// nested filters resolve at the next depth.
    ///
    /// Not-requested relations return untouched: this is the dominant path
    /// and costs two set lookups.
    pub fn load_on_context<C: Context<Query = Q>>(
        self: &Arc<Self>,
        model: &str,
        options: &Arc<dyn OptionSource>,
        context: &mut C,
        namespace: &str,
        info_key: Option<&str>,
        count_only: bool,
    ) -> PrepareResult<()> {
        let context_name = context.model_name().to_string();
        let preparer = self.resolve(model)?;

        let Some(descriptor) = preparer.info(Some(&context_name), info_key)? else {
            return Ok(());
        };
        let relation = descriptor.relation().to_string();
        let foreign_key = descriptor.foreign_key_field().map(str::to_string);

        let key = if count_only {
            format!("{relation}_count")
        } else {
            relation.clone()
        };

        let included = options.includes(&namespace::join(namespace, &key))
            || options.includes(&namespace::join(namespace, &namespace::normalize(&key)));
        if !included {
            trace!(model, relation = %relation, namespace, "relation not requested");
            return Ok(());
        }

        debug!(model, relation = %relation, namespace, count_only, "loading relation on context");

        if let Some(fk) = &foreign_key {
            context.add_select(fk);
        }

        if count_only {
            if context.is_entity() {
                // No native count-eager-loading on a materialized entity:
                // count directly and assign the derived field.
                let count = context.relation_count(&relation);
                context.set_count(&namespace::normalize(&key), count);
            } else {
                context.eager_load_count(&relation);
            }
            return Ok(());
        }

        let registry = Arc::clone(self);
        let options = Arc::clone(options);
        let hook_namespace = namespace.to_string();
        let hook_key = info_key.map(str::to_string);
        context.eager_load(
            &relation,
            Box::new(move |subquery: &mut Q| {
                let run = PrepareRun::new(&registry, &options);
                preparer.prepare(
                    &run,
                    subquery,
                    Some(&context_name),
                    &hook_namespace,
                    hook_key.as_deref(),
                )
            }),
        );

        Ok(())
    }

    fn check_model(&self, model: &str) -> PrepareResult<()> {
        let def = self
            .catalog
            .get(model)
            .ok_or_else(|| PrepareError::UnknownModel(model.to_string()))?;
        if !def.is_entity() {
            return Err(PrepareError::NotAnEntity(model.to_string()));
        }
        Ok(())
    }

    fn check_preparer(&self, model: &str, preparer: &Preparer<Q>) -> PrepareResult<()> {
        if preparer.model() != model {
            return Err(PrepareError::PreparerMismatch {
                declared: preparer.model().to_string(),
                registered: model.to_string(),
            });
        }
        if !self.catalog.contains(preparer.model()) {
            return Err(PrepareError::UnknownModel(preparer.model().to_string()));
        }
        Ok(())
    }
}
