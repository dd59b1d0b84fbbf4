//! Dotted-namespace helpers.
//!
//! A namespace encodes the nesting depth from the request root to the current
//! preparation point, one relation name per segment: `"posts.comments."`.
//! Namespaces under construction always end in a dot except the root (the
//! empty string); option lookups strip trailing dots first.

use convert_case::{Case, Casing};

/// Default ceiling on include-tree nesting. Client-controlled recursion is
/// bounded by this unless the registry overrides it.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Snake-case a relation or path segment for tolerant matching.
pub fn normalize(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// Extend a namespace by one relation hop. The relation name is normalized
/// and a trailing dot keeps the namespace open for deeper nesting.
pub fn child(namespace: &str, relation: &str) -> String {
    format!("{}{}.", namespace, normalize(relation))
}

/// Strip trailing dots for option lookup.
pub fn trim(namespace: &str) -> &str {
    namespace.trim_end_matches('.')
}

/// Number of relation hops this namespace encodes.
pub fn depth(namespace: &str) -> usize {
    let trimmed = trim(namespace);
    if trimmed.is_empty() {
        0
    } else {
        trimmed.matches('.').count() + 1
    }
}

/// Append an include key to a namespace prefix to form a requested path.
pub fn join(namespace: &str, key: &str) -> String {
    format!("{namespace}{key}")
}
