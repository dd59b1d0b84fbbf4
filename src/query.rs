//! The external query and context seams.
//!
//! Preparation never builds SQL and never talks to a driver. It mutates a
//! query through the [`Query`] trait and attaches relations to a context
//! through the [`Context`] trait; any query builder that can answer these
//! calls can be prepared. [`crate::plan::QueryPlan`] and
//! [`crate::plan::Record`] are the in-crate realizations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PrepareResult;
use crate::options::OptionValue;

/// Sort order for an order-by clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order. The default when a directive omits the direction.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse a request-supplied direction. Anything that is not a spelling
    /// of "desc" sorts ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Callback installed on a context; the query builder invokes it when it
/// materializes the relation, handing over the relation subquery.
pub type PrepareHook<Q> = Box<dyn FnOnce(&mut Q) -> PrepareResult<()> + Send>;

/// The query-builder capability consumed by preparation.
pub trait Query: Sized + Send {
    /// Create a fresh query over a model's table (root-level preparation).
    fn new_for(table: &str, model: &str) -> Self;

    /// Replace the select list with a single field.
    fn select(&mut self, field: &str);

    /// Append a field to the select list.
    fn add_select(&mut self, field: &str);

    /// Apply a `field op value` constraint.
    fn filter(&mut self, field: &str, op: &str, value: OptionValue);

    /// Apply a not-null presence constraint.
    fn filter_not_null(&mut self, field: &str);

    /// Append a secondary sort key.
    fn order_by(&mut self, field: &str, order: SortOrder);

    /// Limit the result set.
    fn take(&mut self, n: u64);

    /// Skip leading rows.
    fn skip(&mut self, n: u64);

    /// When this query represents a has-many relation traversal, the
    /// qualified foreign key that must be selected for hydration to match
    /// children back to parents. `None` for plain queries.
    fn has_many_foreign_key(&self) -> Option<String>;
}

/// The context onto which a relation attaches: either a pending query or an
/// already-materialized entity. The implementation embodies the loading
/// strategy; [`Context::is_entity`] is the capability check that picks
/// between native count-eager-loading and the direct-count fallback.
pub trait Context {
    /// The subquery type handed to prepare hooks.
    type Query: Query;

    /// Basename of the context's underlying model type.
    fn model_name(&self) -> &str;

    /// Pre-select a field on the context (the relation's foreign key).
    fn add_select(&mut self, field: &str);

    /// Whether this context is a live entity (supports serialization) rather
    /// than a pending query.
    fn is_entity(&self) -> bool;

    /// Install an eager load for a relation; the hook runs when the builder
    /// materializes it.
    fn eager_load(&mut self, relation: &str, hook: PrepareHook<Self::Query>);

    /// Install a native relation-count eager load. Only called on pending
    /// queries.
    fn eager_load_count(&mut self, relation: &str);

    /// Count a relation's rows directly. Only called on live entities, as
    /// the fallback when native count-eager-loading is unavailable.
    fn relation_count(&self, relation: &str) -> u64;

    /// Assign a computed count onto a count-named field.
    fn set_count(&mut self, field: &str, count: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Asc);
    }

    #[test]
    fn test_sort_order_sql() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.to_string(), "DESC");
        assert_eq!(SortOrder::default(), SortOrder::Asc);
    }
}
