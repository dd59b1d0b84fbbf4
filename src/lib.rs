//! # eagerly
//!
//! Namespace-scoped query preparation and conditional eager loading.
//!
//! Clients describe, per relation path, which relations to include and which
//! order/where/limit/offset constraints to apply at each nesting level. This
//! crate resolves those options against a per-model [`Preparer`] registry and
//! turns them into prepared queries, including nested relation subqueries:
//! - Per-model preparers with field selection, constraints and extend hooks
//! - Dotted namespaces scoping options to their nesting level
//! - Conditional relation loading driven by the request's include set
//! - Relation counts, native on pending queries with an entity fallback
//! - A driver-free [`QueryPlan`] builder that renders parameterized SQL
//!
//! ## Preparing a query
//!
//! Register a preparer per model, then prepare against a request's options:
//!
//! ```rust
//! use std::sync::Arc;
//! use eagerly::{
//!     Catalog, ContextDescriptor, ModelDef, OptionKey, OptionSource, ParsedOptions,
//!     Preparer, QueryPlan, Registry, RequestOptions,
//! };
//!
//! let catalog = Catalog::new()
//!     .model(ModelDef::new("Author", "users"))
//!     .model(ModelDef::new("Post", "posts"));
//! let registry = Arc::new(Registry::<QueryPlan>::new(catalog));
//!
//! registry.register(
//!     "Author",
//!     Preparer::new("Author", "users").extend(|query, namespace, run| {
//!         run.load("Post", query, namespace, None)
//!     }),
//! )?;
//! registry.register(
//!     "Post",
//!     Preparer::new("Post", "posts").context(
//!         "Author",
//!         ContextDescriptor::new("posts").foreign_key("posts.author_id"),
//!     ),
//! )?;
//!
//! let parsed = ParsedOptions::new()
//!     .include("posts")
//!     .option("posts", OptionKey::Limit, [10i64]);
//! let options: Arc<dyn OptionSource> = Arc::new(RequestOptions::new(parsed));
//!
//! let query = registry.prepare("Author", &options, None)?;
//! assert_eq!(query.selects(), ["users.id", "posts.author_id"]);
//! assert_eq!(query.eager_relations(), ["posts"]);
//! # Ok::<(), eagerly::PrepareError>(())
//! ```
//!
//! ## Option Values
//!
//! Convert Rust types to option values:
//!
//! ```rust
//! use eagerly::OptionValue;
//!
//! let val: OptionValue = 42.into();
//! assert!(matches!(val, OptionValue::Int(42)));
//!
//! let val: OptionValue = "hello".into();
//! assert!(matches!(val, OptionValue::String(_)));
//!
//! // Numeric gate: counts come from non-negative ints, integral floats
//! // and numeric strings.
//! assert_eq!(OptionValue::from("30").as_u64(), Some(30));
//! assert_eq!(OptionValue::from("lots").as_u64(), None);
//! ```
//!
//! ## Rendering SQL
//!
//! A prepared [`QueryPlan`] renders to parameterized SQL on demand:
//!
//! ```rust
//! use eagerly::{OptionValue, Query, QueryPlan, SortOrder};
//!
//! let mut plan = QueryPlan::new_for("users", "User");
//! plan.select("users.id");
//! plan.filter("age", ">", OptionValue::Int(21));
//! plan.order_by("created_at", SortOrder::Desc);
//!
//! let (sql, params) = plan.to_sql();
//! assert_eq!(
//!     sql,
//!     "SELECT users.id FROM users WHERE age > $1 ORDER BY created_at DESC"
//! );
//! assert_eq!(params, vec![OptionValue::Int(21)]);
//! ```
//!
//! ## Error Handling
//!
//! Configuration, lookup and usage failures are distinguished by kind:
//!
//! ```rust
//! use eagerly::{ErrorKind, PrepareError};
//!
//! let err = PrepareError::UnknownModel("Ghost".into());
//! assert_eq!(err.kind(), ErrorKind::Configuration);
//! ```

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod namespace;
pub mod options;
pub mod plan;
pub mod preparer;
pub mod query;
pub mod registry;

pub use catalog::{Catalog, ModelDef};
pub use descriptor::{ContextDescriptor, ContextInfo};
pub use error::{ErrorKind, PrepareError, PrepareResult};
pub use options::{
    OptionKey, OptionSource, OptionTuple, OptionValue, ParsedOptions, RequestOptions,
};
pub use plan::{QueryFilter, QueryPlan, Record};
pub use preparer::{ExtendFn, Preparer};
pub use query::{Context, PrepareHook, Query, SortOrder};
pub use registry::{PrepareRun, Registry};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{Catalog, ModelDef};
    pub use crate::descriptor::ContextDescriptor;
    pub use crate::error::{PrepareError, PrepareResult};
    pub use crate::options::{OptionKey, OptionSource, OptionValue, ParsedOptions, RequestOptions};
    pub use crate::plan::{QueryPlan, Record};
    pub use crate::preparer::Preparer;
    pub use crate::query::{Context, Query, SortOrder};
    pub use crate::registry::{PrepareRun, Registry};
}
