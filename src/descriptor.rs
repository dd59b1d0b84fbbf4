//! Relation descriptors: how a model attaches to a context model.

use indexmap::IndexMap;

use crate::error::{PrepareError, PrepareResult};

/// Immutable description of how a related model attaches to one context
/// model: the relation accessor name on the context, plus an optional
/// foreign-key field that must be pre-selected on the context so the
/// eager load or count can join without an extra round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDescriptor {
    relation: String,
    foreign_key: Option<String>,
}

impl ContextDescriptor {
    /// Describe a relation by its accessor name on the context model.
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            foreign_key: None,
        }
    }

    /// Set the foreign-key field to pre-select on the context.
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = Some(field.into());
        self
    }

    /// The relation accessor name.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// The foreign-key field, if one is needed.
    pub fn foreign_key_field(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
struct ContextEntry {
    default: Option<ContextDescriptor>,
    keyed: IndexMap<String, ContextDescriptor>,
}

/// Per-preparer table of relation descriptors, looked up by context model
/// name and an optional sub-key (a model may attach to the same context
/// through more than one relation).
///
/// Lookup of a `None` context is not an error: it yields no descriptor and
/// means root-level preparation. Lookup of a named but unknown context is a
/// misconfiguration and fails.
#[derive(Debug, Clone, Default)]
pub struct ContextInfo {
    entries: IndexMap<String, ContextEntry>,
}

impl ContextInfo {
    /// Create an empty descriptor table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default descriptor for a context model.
    pub fn insert(&mut self, context: impl Into<String>, descriptor: ContextDescriptor) {
        self.entries.entry(context.into()).or_default().default = Some(descriptor);
    }

    /// Set a keyed descriptor for a context model.
    pub fn insert_keyed(
        &mut self,
        context: impl Into<String>,
        key: impl Into<String>,
        descriptor: ContextDescriptor,
    ) {
        self.entries
            .entry(context.into())
            .or_default()
            .keyed
            .insert(key.into(), descriptor);
    }

    /// Resolve the descriptor for a context model and optional sub-key.
    ///
    /// `None` context resolves to no descriptor. A named context must exist,
    /// and a requested sub-key must exist under it.
    pub fn lookup(
        &self,
        context: Option<&str>,
        key: Option<&str>,
    ) -> PrepareResult<Option<&ContextDescriptor>> {
        let Some(context) = context else {
            return Ok(None);
        };

        let entry = self
            .entries
            .get(context)
            .ok_or_else(|| PrepareError::UnknownContext(context.to_string()))?;

        match key {
            Some(key) => entry
                .keyed
                .get(key)
                .map(Some)
                .ok_or_else(|| PrepareError::UnknownContextInfoKey {
                    context: context.to_string(),
                    key: key.to_string(),
                }),
            None => entry
                .default
                .as_ref()
                .map(Some)
                .ok_or_else(|| PrepareError::UnknownContext(context.to_string())),
        }
    }

    /// Whether any descriptor exists for the named context.
    pub fn has_context(&self, context: &str) -> bool {
        self.entries.contains_key(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_descriptor_builder() {
        let d = ContextDescriptor::new("posts").foreign_key("posts.author_id");
        assert_eq!(d.relation(), "posts");
        assert_eq!(d.foreign_key_field(), Some("posts.author_id"));
    }

    #[test]
    fn test_null_context_yields_no_descriptor() {
        let info = ContextInfo::new();
        assert_eq!(info.lookup(None, None).unwrap(), None);
    }

    #[test]
    fn test_unknown_context_is_an_error() {
        let info = ContextInfo::new();
        let err = info.lookup(Some("Author"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn test_default_and_keyed_lookup() {
        let mut info = ContextInfo::new();
        info.insert("Author", ContextDescriptor::new("posts"));
        info.insert_keyed(
            "Author",
            "pinned",
            ContextDescriptor::new("pinnedPosts").foreign_key("posts.author_id"),
        );

        let default = info.lookup(Some("Author"), None).unwrap().unwrap();
        assert_eq!(default.relation(), "posts");

        let keyed = info.lookup(Some("Author"), Some("pinned")).unwrap().unwrap();
        assert_eq!(keyed.relation(), "pinnedPosts");

        let err = info.lookup(Some("Author"), Some("missing")).unwrap_err();
        assert!(matches!(err, PrepareError::UnknownContextInfoKey { .. }));
    }
}
