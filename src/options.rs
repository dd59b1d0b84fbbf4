//! Request option values and the option source seam.
//!
//! A request arrives as a tree of directives scoped by dotted namespaces:
//! `order`, `where`, `limit` and `offset` tuples per namespace, plus a set of
//! requested include paths. The parser that produces this tree lives outside
//! the crate; preparation consumes it through the [`OptionSource`] trait.
//!
//! [`RequestOptions`] is the concrete, request-scoped implementation: an
//! in-memory option tree with an optional reload hook so a stale instance
//! (reused across test cases, resurrected from a cache) can re-parse the
//! current request before use.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::namespace;

/// The option categories a namespace can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKey {
    /// Sort directives, applied in request order.
    Order,
    /// Filter directives, interpreted by arity.
    Where,
    /// Row limit; last one wins.
    Limit,
    /// Row offset; last one wins.
    Offset,
}

impl OptionKey {
    /// The wire name of this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Where => "where",
            Self::Limit => "limit",
            Self::Offset => "offset",
        }
    }
}

/// A single value inside an option tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
}

impl OptionValue {
    /// Check whether this value is "falsy" in the request-parameter sense:
    /// null, `false`, `0`, `0.0` or the empty string.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::String(s) => s.is_empty(),
        }
    }

    /// View this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret this value as a non-negative count, the way limit and
    /// offset directives require: a non-negative integer, an integral
    /// non-negative float, or a string that parses as one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(i) if *i >= 0 => Some(*i as u64),
            Self::Float(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            Self::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// One parsed directive: `["email"]`, `["age", 5]`, `["age", ">", 5]`,
/// `["created_at", "desc"]`, `["10"]`.
pub type OptionTuple = Vec<OptionValue>;

/// The option resolver seam.
///
/// Preparation consumes request options exclusively through this trait, so
/// any parser that can answer these three questions can drive it. Namespaces
/// are looked up with trailing dots stripped.
pub trait OptionSource: Send + Sync {
    /// Options of the given kind at the given namespace, or `None` when the
    /// namespace carries none. Absence is always a no-op for callers.
    fn option(&self, namespace: &str, key: OptionKey) -> Option<Vec<OptionTuple>>;

    /// Whether the client requested this include path.
    fn includes(&self, path: &str) -> bool;

    /// Re-parse the current request parameters if the source went stale.
    /// Called at the top of every preparation; the default does nothing.
    fn refresh_if_needed(&self) {}
}

/// The parsed option tree: options keyed by namespace and kind, plus the set
/// of requested include paths.
#[derive(Debug, Clone, Default)]
pub struct ParsedOptions {
    options: IndexMap<String, IndexMap<OptionKey, Vec<OptionTuple>>>,
    includes: HashSet<String>,
}

impl ParsedOptions {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option tuple at a namespace. Tuples accumulate in insertion
    /// order; that order is semantic for `order` (left-to-right composition)
    /// and for `limit`/`offset` (last one wins).
    pub fn option(
        mut self,
        ns: impl Into<String>,
        key: OptionKey,
        tuple: impl IntoIterator<Item = impl Into<OptionValue>>,
    ) -> Self {
        let ns = namespace::trim(&ns.into()).to_string();
        self.options
            .entry(ns)
            .or_default()
            .entry(key)
            .or_default()
            .push(tuple.into_iter().map(Into::into).collect());
        self
    }

    /// Mark an include path as requested.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.insert(path.into());
        self
    }

    fn lookup(&self, ns: &str, key: OptionKey) -> Option<Vec<OptionTuple>> {
        self.options
            .get(namespace::trim(ns))
            .and_then(|by_key| by_key.get(&key))
            .cloned()
    }

    fn has(&self, path: &str) -> bool {
        self.includes.contains(path)
    }
}

type ReloadFn = Box<dyn Fn() -> ParsedOptions + Send + Sync>;

/// Request-scoped option resolver.
///
/// Constructed at the start of a request and discarded at the end; preparers
/// themselves stay stateless and shared. When built with a reload hook,
/// [`RequestOptions::mark_stale`] forces the next preparation to re-parse
/// before reading anything.
pub struct RequestOptions {
    parsed: RwLock<ParsedOptions>,
    stale: AtomicBool,
    reload: Option<ReloadFn>,
}

impl RequestOptions {
    /// Wrap an already-parsed option tree.
    pub fn new(parsed: ParsedOptions) -> Self {
        Self {
            parsed: RwLock::new(parsed),
            stale: AtomicBool::new(false),
            reload: None,
        }
    }

    /// Build from a reload hook. The hook is invoked once up front and again
    /// whenever the instance is marked stale.
    pub fn with_reload(reload: impl Fn() -> ParsedOptions + Send + Sync + 'static) -> Self {
        Self {
            parsed: RwLock::new(reload()),
            stale: AtomicBool::new(false),
            reload: Some(Box::new(reload)),
        }
    }

    /// Flag the parsed tree as stale so the next preparation re-parses.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

impl OptionSource for RequestOptions {
    fn option(&self, namespace: &str, key: OptionKey) -> Option<Vec<OptionTuple>> {
        self.parsed.read().lookup(namespace, key)
    }

    fn includes(&self, path: &str) -> bool {
        self.parsed.read().has(path)
    }

    fn refresh_if_needed(&self) {
        if self.stale.swap(false, Ordering::AcqRel) {
            if let Some(reload) = &self.reload {
                tracing::debug!("option source stale, re-parsing request parameters");
                *self.parsed.write() = reload();
            }
        }
    }
}

impl From<ParsedOptions> for RequestOptions {
    fn from(parsed: ParsedOptions) -> Self {
        Self::new(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_falsy_values() {
        assert!(OptionValue::Null.is_falsy());
        assert!(OptionValue::Bool(false).is_falsy());
        assert!(OptionValue::Int(0).is_falsy());
        assert!(OptionValue::Float(0.0).is_falsy());
        assert!(OptionValue::String(String::new()).is_falsy());

        assert!(!OptionValue::Bool(true).is_falsy());
        assert!(!OptionValue::Int(-1).is_falsy());
        assert!(!OptionValue::from("0").is_falsy());
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(OptionValue::Int(10).as_u64(), Some(10));
        assert_eq!(OptionValue::Int(-1).as_u64(), None);
        assert_eq!(OptionValue::Float(5.0).as_u64(), Some(5));
        assert_eq!(OptionValue::Float(5.5).as_u64(), None);
        assert_eq!(OptionValue::from("25").as_u64(), Some(25));
        assert_eq!(OptionValue::from("abc").as_u64(), None);
        assert_eq!(OptionValue::Null.as_u64(), None);
    }

    #[test]
    fn test_lookup_strips_trailing_dots() {
        let opts = RequestOptions::new(
            ParsedOptions::new().option("posts.comments", OptionKey::Limit, ["5"]),
        );

        assert!(opts.option("posts.comments.", OptionKey::Limit).is_some());
        assert!(opts.option("posts.comments", OptionKey::Limit).is_some());
        assert!(opts.option("posts", OptionKey::Limit).is_none());
    }

    #[test]
    fn test_option_order_preserved() {
        let opts = RequestOptions::new(
            ParsedOptions::new()
                .option("", OptionKey::Limit, ["10"])
                .option("", OptionKey::Limit, ["20"]),
        );

        let tuples = opts.option("", OptionKey::Limit).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[1], vec![OptionValue::from("20")]);
    }

    #[test]
    fn test_includes() {
        let opts = RequestOptions::new(ParsedOptions::new().include("posts.comments"));
        assert!(opts.includes("posts.comments"));
        assert!(!opts.includes("posts"));
    }

    #[test]
    fn test_refresh_reloads_when_stale() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let generation = Arc::new(AtomicUsize::new(0));
        let gen_clone = Arc::clone(&generation);

        let opts = RequestOptions::with_reload(move || {
            let n = gen_clone.fetch_add(1, Ordering::SeqCst);
            ParsedOptions::new().option("", OptionKey::Limit, [n as i64])
        });
        assert_eq!(generation.load(Ordering::SeqCst), 1);

        // Not stale: refresh is a no-op.
        opts.refresh_if_needed();
        assert_eq!(generation.load(Ordering::SeqCst), 1);

        opts.mark_stale();
        opts.refresh_if_needed();
        assert_eq!(generation.load(Ordering::SeqCst), 2);

        let tuples = opts.option("", OptionKey::Limit).unwrap();
        assert_eq!(tuples[0], vec![OptionValue::Int(1)]);
    }

    #[test]
    fn test_option_value_deserializes_untagged() {
        let tuple: OptionTuple = serde_json::from_str(r#"["age", ">", 5]"#).unwrap();
        assert_eq!(
            tuple,
            vec![
                OptionValue::from("age"),
                OptionValue::from(">"),
                OptionValue::Int(5)
            ]
        );
    }
}
