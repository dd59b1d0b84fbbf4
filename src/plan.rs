//! In-crate realizations of the query and context seams.
//!
//! [`QueryPlan`] is a driver-free query builder: it records what preparation
//! asked for and can render itself to parameterized SQL for a driver to
//! execute. [`Record`] is a materialized entity, the live-object counterpart
//! a relation can attach to after the fact.

use std::fmt;

use indexmap::IndexMap;

use crate::error::PrepareResult;
use crate::options::OptionValue;
use crate::query::{Context, PrepareHook, Query, SortOrder};

/// A single recorded constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// `field op value` comparison.
    Compare {
        field: String,
        op: String,
        value: OptionValue,
    },
    /// `field IS NOT NULL` presence check.
    NotNull { field: String },
}

struct EagerLoad {
    relation: String,
    hook: Option<PrepareHook<QueryPlan>>,
    count: bool,
}

/// A pending query: accumulates selection, constraints and eager loads, and
/// renders to SQL with `$n` placeholders on demand.
pub struct QueryPlan {
    model: String,
    table: String,
    selects: Vec<String>,
    filters: Vec<QueryFilter>,
    orders: Vec<(String, SortOrder)>,
    take: Option<u64>,
    skip: Option<u64>,
    foreign_key: Option<String>,
    eager: Vec<EagerLoad>,
}

impl QueryPlan {
    /// Mark this plan as a has-many relation traversal, recording the
    /// qualified foreign key hydration will match children on.
    pub fn as_has_many(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }

    /// The model this plan queries.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The table this plan queries.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The select list, in application order.
    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    /// The recorded constraints, in application order.
    pub fn filters(&self) -> &[QueryFilter] {
        &self.filters
    }

    /// The sort keys, in application order.
    pub fn orders(&self) -> &[(String, SortOrder)] {
        &self.orders
    }

    /// The row limit, if one was applied.
    pub fn limit(&self) -> Option<u64> {
        self.take
    }

    /// The row offset, if one was applied.
    pub fn offset(&self) -> Option<u64> {
        self.skip
    }

    /// Names of the relations installed for full eager loading.
    pub fn eager_relations(&self) -> Vec<&str> {
        self.eager
            .iter()
            .filter(|load| !load.count)
            .map(|load| load.relation.as_str())
            .collect()
    }

    /// Whether any eager load (full or count) is installed.
    pub fn has_eager(&self) -> bool {
        !self.eager.is_empty()
    }

    /// Whether a native count eager load is installed for a relation.
    pub fn has_count(&self, relation: &str) -> bool {
        self.eager
            .iter()
            .any(|load| load.count && load.relation == relation)
    }

    /// Run the prepare hook installed for a relation against its subquery.
    /// Returns whether a hook ran; each hook runs at most once.
    pub fn apply_eager(&mut self, relation: &str, subquery: &mut QueryPlan) -> PrepareResult<bool> {
        for load in &mut self.eager {
            if load.relation == relation {
                if let Some(hook) = load.hook.take() {
                    hook(subquery)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Render the plan to a SQL string with `$n` placeholders and its bound
    /// parameters, in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<OptionValue>) {
        let mut sql = String::from("SELECT ");
        if self.selects.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.selects.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        let mut params = Vec::new();
        let mut clauses = Vec::new();
        for filter in &self.filters {
            match filter {
                QueryFilter::Compare { field, op, value } => {
                    params.push(value.clone());
                    clauses.push(format!("{field} {op} ${}", params.len()));
                }
                QueryFilter::NotNull { field } => {
                    clauses.push(format!("{field} IS NOT NULL"));
                }
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.orders.is_empty() {
            let keys: Vec<String> = self
                .orders
                .iter()
                .map(|(field, order)| format!("{field} {order}"))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(n) = self.take {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(n) = self.skip {
            sql.push_str(&format!(" OFFSET {n}"));
        }

        (sql, params)
    }
}

impl fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("model", &self.model)
            .field("table", &self.table)
            .field("selects", &self.selects)
            .field("filters", &self.filters)
            .field("orders", &self.orders)
            .field("take", &self.take)
            .field("skip", &self.skip)
            .field("foreign_key", &self.foreign_key)
            .field(
                "eager",
                &self
                    .eager
                    .iter()
                    .map(|load| load.relation.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Query for QueryPlan {
    fn new_for(table: &str, model: &str) -> Self {
        Self {
            model: model.to_string(),
            table: table.to_string(),
            selects: Vec::new(),
            filters: Vec::new(),
            orders: Vec::new(),
            take: None,
            skip: None,
            foreign_key: None,
            eager: Vec::new(),
        }
    }

    fn select(&mut self, field: &str) {
        self.selects.clear();
        self.selects.push(field.to_string());
    }

    fn add_select(&mut self, field: &str) {
        if !self.selects.iter().any(|f| f == field) {
            self.selects.push(field.to_string());
        }
    }

    fn filter(&mut self, field: &str, op: &str, value: OptionValue) {
        self.filters.push(QueryFilter::Compare {
            field: field.to_string(),
            op: op.to_string(),
            value,
        });
    }

    fn filter_not_null(&mut self, field: &str) {
        self.filters.push(QueryFilter::NotNull {
            field: field.to_string(),
        });
    }

    fn order_by(&mut self, field: &str, order: SortOrder) {
        self.orders.push((field.to_string(), order));
    }

    fn take(&mut self, n: u64) {
        self.take = Some(n);
    }

    fn skip(&mut self, n: u64) {
        self.skip = Some(n);
    }

    fn has_many_foreign_key(&self) -> Option<String> {
        self.foreign_key.clone()
    }
}

impl Context for QueryPlan {
    type Query = QueryPlan;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn add_select(&mut self, field: &str) {
        Query::add_select(self, field);
    }

    fn is_entity(&self) -> bool {
        false
    }

    fn eager_load(&mut self, relation: &str, hook: PrepareHook<Self::Query>) {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            hook: Some(hook),
            count: false,
        });
    }

    fn eager_load_count(&mut self, relation: &str) {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            hook: None,
            count: true,
        });
    }

    fn relation_count(&self, _relation: &str) -> u64 {
        // Pending queries take the native count path instead.
        0
    }

    fn set_count(&mut self, _field: &str, _count: u64) {}
}

/// A materialized entity: field values plus already-loaded relation rows.
/// Relations attach to it after the fact, which is what makes the direct
/// count fallback reachable.
pub struct Record {
    model: String,
    values: IndexMap<String, OptionValue>,
    relations: IndexMap<String, Vec<Record>>,
    selects: Vec<String>,
    eager: Vec<EagerLoad>,
}

impl Record {
    /// Create an entity of a model type with no fields loaded.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            values: IndexMap::new(),
            relations: IndexMap::new(),
            selects: Vec::new(),
            eager: Vec::new(),
        }
    }

    /// Set a field value.
    pub fn value(mut self, field: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Attach already-loaded relation rows.
    pub fn relation(mut self, name: impl Into<String>, rows: Vec<Record>) -> Self {
        self.relations.insert(name.into(), rows);
        self
    }

    /// Read a field value.
    pub fn get(&self, field: &str) -> Option<&OptionValue> {
        self.values.get(field)
    }

    /// Fields requested onto this entity during relation loading.
    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    /// Names of the relations installed for full eager loading.
    pub fn eager_relations(&self) -> Vec<&str> {
        self.eager
            .iter()
            .filter(|load| !load.count)
            .map(|load| load.relation.as_str())
            .collect()
    }

    /// Run the prepare hook installed for a relation against its subquery.
    /// Returns whether a hook ran; each hook runs at most once.
    pub fn apply_eager(&mut self, relation: &str, subquery: &mut QueryPlan) -> PrepareResult<bool> {
        for load in &mut self.eager {
            if load.relation == relation {
                if let Some(hook) = load.hook.take() {
                    hook(subquery)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model)
            .field("values", &self.values)
            .field(
                "relations",
                &self
                    .relations
                    .iter()
                    .map(|(name, rows)| (name.as_str(), rows.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Context for Record {
    type Query = QueryPlan;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn add_select(&mut self, field: &str) {
        if !self.selects.iter().any(|f| f == field) {
            self.selects.push(field.to_string());
        }
    }

    fn is_entity(&self) -> bool {
        true
    }

    fn eager_load(&mut self, relation: &str, hook: PrepareHook<Self::Query>) {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            hook: Some(hook),
            count: false,
        });
    }

    fn eager_load_count(&mut self, relation: &str) {
        self.eager.push(EagerLoad {
            relation: relation.to_string(),
            hook: None,
            count: true,
        });
    }

    fn relation_count(&self, relation: &str) -> u64 {
        self.relations
            .get(relation)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0)
    }

    fn set_count(&mut self, field: &str, count: u64) {
        self.values
            .insert(field.to_string(), OptionValue::Int(count as i64));
    }
}
