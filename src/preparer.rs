//! Per-model preparers.
//!
//! A [`Preparer`] is constructed once per model type, cached in the registry,
//! and reused across every request the process handles. It carries no
//! per-request state: all request data flows through the [`PrepareRun`]
//! handed into [`Preparer::prepare`] and the query being mutated.
//!
//! Preparation applies, in a fixed order: basic field selection, the
//! model-specific extend hook (where nested relation loads are wired up),
//! then order, where, limit and offset constraints resolved from the option
//! source at this nesting level's namespace.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::descriptor::{ContextDescriptor, ContextInfo};
use crate::error::{PrepareError, PrepareResult};
use crate::namespace;
use crate::options::{OptionKey, OptionSource, OptionValue};
use crate::query::{Query, SortOrder};
use crate::registry::PrepareRun;

/// Model-specific extension hook. Runs after basic field selection with the
/// query, the effective namespace for this nesting level, and the run, so it
/// can trigger nested relation loads via [`PrepareRun::load`].
pub type ExtendFn<Q> =
    Arc<dyn Fn(&mut Q, &str, &PrepareRun<'_, Q>) -> PrepareResult<()> + Send + Sync>;

/// Per-model preparer: applies field selection, the extend hook, and
/// namespace-scoped order/where/limit/offset constraints to a query.
///
/// Model and table are declared explicitly at construction; nothing is
/// derived from type names.
pub struct Preparer<Q: Query> {
    model: String,
    table: String,
    primary_key: String,
    context_info: ContextInfo,
    extend: Option<ExtendFn<Q>>,
}

impl<Q: Query> std::fmt::Debug for Preparer<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preparer")
            .field("model", &self.model)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("context_info", &self.context_info)
            .field("extend", &self.extend.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<Q: Query + 'static> Preparer<Q> {
    /// Create a preparer for a model and its storage table. The primary key
    /// defaults to `id`.
    pub fn new(model: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            context_info: ContextInfo::new(),
            extend: None,
        }
    }

    /// Override the primary key field.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Declare how this model attaches to a context model.
    pub fn context(mut self, context: impl Into<String>, descriptor: ContextDescriptor) -> Self {
        self.context_info.insert(context, descriptor);
        self
    }

    /// Declare a keyed attachment for a context model that this model
    /// relates to through more than one relation.
    pub fn context_keyed(
        mut self,
        context: impl Into<String>,
        key: impl Into<String>,
        descriptor: ContextDescriptor,
    ) -> Self {
        self.context_info.insert_keyed(context, key, descriptor);
        self
    }

    /// Attach the model-specific extension hook.
    pub fn extend(
        mut self,
        hook: impl Fn(&mut Q, &str, &PrepareRun<'_, Q>) -> PrepareResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.extend = Some(Arc::new(hook));
        self
    }

    /// The model this preparer targets.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The model's storage table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Resolve the relation descriptor for a context model and optional
    /// sub-key. A `None` context yields no descriptor (root preparation).
    pub fn info(
        &self,
        context: Option<&str>,
        key: Option<&str>,
    ) -> PrepareResult<Option<&ContextDescriptor>> {
        self.context_info.lookup(context, key)
    }

    /// Prepare a query at one nesting level.
    ///
    /// Resolves the descriptor for `context_model`, extends the namespace by
    /// one hop when a descriptor is found, selects basic fields, runs the
    /// extend hook, then applies order, where, limit and offset options
    /// looked up at the effective namespace. Absent options are a no-op at
    /// every stage.
    pub fn prepare(
        &self,
        run: &PrepareRun<'_, Q>,
        query: &mut Q,
        context_model: Option<&str>,
        namespace: &str,
        info_key: Option<&str>,
    ) -> PrepareResult<()> {
        let options = run.options();
        options.refresh_if_needed();

        let namespace = match self.info(context_model, info_key)? {
            Some(descriptor) => namespace::child(namespace, descriptor.relation()),
            None => namespace.to_string(),
        };

        let max = run.max_depth();
        if namespace::depth(&namespace) > max {
            return Err(PrepareError::DepthExceeded { namespace, max });
        }

        debug!(model = %self.model, namespace = %namespace, "preparing query");

        self.select_basic_fields(query);

        if let Some(extend) = &self.extend {
            extend(query, &namespace, run)?;
        }

        let clean = namespace::trim(&namespace);
        self.apply_order(query, clean, options.as_ref());
        self.apply_wheres(query, clean, options.as_ref());
        self.apply_limit(query, clean, options.as_ref());
        self.apply_offset(query, clean, options.as_ref());

        Ok(())
    }

    /// Select the qualified primary key, plus the qualified foreign key when
    /// the query traverses a has-many relation (required for hydration).
    fn select_basic_fields(&self, query: &mut Q) {
        query.select(&format!("{}.{}", self.table, self.primary_key));

        if let Some(fk) = query.has_many_foreign_key() {
            query.add_select(&fk);
        }
    }

    fn apply_order(&self, query: &mut Q, namespace: &str, options: &dyn OptionSource) {
        let Some(orders) = options.option(namespace, OptionKey::Order) else {
            return;
        };

        for order in orders {
            let Some(field) = order.first().and_then(OptionValue::as_str) else {
                continue;
            };
            let direction = order
                .get(1)
                .and_then(OptionValue::as_str)
                .map(SortOrder::parse)
                .unwrap_or_default();
            trace!(namespace, field, %direction, "order option");
            query.order_by(field, direction);
        }
    }

    /// Interpret where clauses by arity: one element is a not-null presence
    /// filter, two is equality, three is `(field, operator, value)`. A falsy
    /// resolved value degrades to a not-null filter on the field.
    fn apply_wheres(&self, query: &mut Q, namespace: &str, options: &dyn OptionSource) {
        let Some(wheres) = options.option(namespace, OptionKey::Where) else {
            return;
        };

        for clause in wheres {
            let field = match clause.first() {
                Some(v) if !v.is_falsy() => match v.as_str() {
                    Some(s) => s.to_string(),
                    None => continue,
                },
                _ => continue,
            };

            let (op, value) = match clause.len() {
                1 => ("=", OptionValue::Null),
                2 => ("=", clause[1].clone()),
                _ => (
                    clause[1].as_str().unwrap_or("="),
                    clause[2].clone(),
                ),
            };

            trace!(namespace, field = %field, op, "where option");
            if value.is_falsy() {
                query.filter_not_null(&field);
            } else {
                query.filter(&field, op, value);
            }
        }
    }

    fn apply_limit(&self, query: &mut Q, namespace: &str, options: &dyn OptionSource) {
        if let Some(n) = Self::last_numeric(options.option(namespace, OptionKey::Limit)) {
            trace!(namespace, n, "limit option");
            query.take(n);
        }
    }

    fn apply_offset(&self, query: &mut Q, namespace: &str, options: &dyn OptionSource) {
        if let Some(n) = Self::last_numeric(options.option(namespace, OptionKey::Offset)) {
            trace!(namespace, n, "offset option");
            query.skip(n);
        }
    }

    /// Last-declared tuple wins; applied only when its first element is a
    /// valid count.
    fn last_numeric(tuples: Option<Vec<Vec<OptionValue>>>) -> Option<u64> {
        tuples?
            .last()
            .and_then(|tuple| tuple.first())
            .and_then(OptionValue::as_u64)
    }
}
