//! External-id codec and catalog template cache lookups
//!
//! A cluster references its chosen catalog template through a compound
//! "external id" of the form `<kind>://<id>`. The catalog itself is loaded
//! and owned elsewhere; this module only parses/formats the identifier and
//! performs best-effort lookups against an already-populated cache.

use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

/// Separator between the kind tag and the opaque id
///
/// Shared across the whole identifier scheme, not only catalog ids.
pub const KIND_SEPARATOR: &str = "://";

/// Kind tag for catalog template references
pub const KIND_CATALOG: &str = "catalog";

/// Parsed form of a compound external identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalId {
    /// Namespace tag (e.g. "catalog")
    pub kind: String,
    /// Opaque reference string
    pub id: String,
}

impl ExternalId {
    /// Format an external id from a kind and an optional id
    ///
    /// Returns `None` when the id is absent or empty - no identifier can be
    /// formed.
    pub fn encode(kind: &str, id: Option<&str>) -> Option<String> {
        match id {
            Some(id) if !id.is_empty() => Some(format!("{kind}{KIND_SEPARATOR}{id}")),
            _ => None,
        }
    }

    /// Parse an encoded external id
    ///
    /// Splits on the first occurrence of [`KIND_SEPARATOR`]. Returns `None`
    /// when the separator is absent or the string is empty. Callers treat
    /// `None` as "no identifier", never as an error to surface.
    pub fn parse(encoded: &str) -> Option<Self> {
        if encoded.is_empty() {
            return None;
        }
        let (kind, id) = encoded.split_once(KIND_SEPARATOR)?;
        Some(Self {
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.kind, KIND_SEPARATOR, self.id)
    }
}

/// A catalog template entry as held by the catalog cache
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTemplate {
    /// Template identifier (the id part of an external id)
    pub id: String,

    /// Link to the template's icon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_link: Option<String>,

    /// Categories the template is filed under
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// Read-only lookup into a catalog cache populated elsewhere
///
/// Lookups must never trigger a fetch. A `None` result means the cache has
/// not been populated yet or the id is unknown; callers tolerate both.
#[cfg_attr(test, automock)]
pub trait TemplateCache: Send + Sync {
    /// Look up a template by its id
    fn template(&self, id: &str) -> Option<CatalogTemplate>;
}

/// Thread-safe in-memory template cache
///
/// The catalog service fills this from a separately-triggered full catalog
/// load; Rudder only reads it.
#[derive(Debug, Default)]
pub struct MemoryTemplateCache {
    templates: DashMap<String, CatalogTemplate>,
}

impl MemoryTemplateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a template
    pub fn insert(&self, template: CatalogTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Number of cached templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateCache for MemoryTemplateCache {
    fn template(&self, id: &str) -> Option<CatalogTemplate> {
        self.templates.get(id).map(|t| t.clone())
    }
}

/// The template reference fields carried on a cluster's catalog selection
///
/// The external id is derived from the version id when one is set, falling
/// back to the template id.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTemplateRef {
    /// Reference to the template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    /// Reference to a specific template version (preferred when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version_id: Option<String>,
}

impl CatalogTemplateRef {
    /// The encoded external id for this reference, if one can be formed
    pub fn external_id(&self) -> Option<String> {
        let id = self
            .template_version_id
            .as_deref()
            .or(self.template_id.as_deref());
        ExternalId::encode(KIND_CATALOG, id)
    }

    /// The parsed form of [`external_id`](Self::external_id)
    pub fn external_id_info(&self) -> Option<ExternalId> {
        ExternalId::parse(&self.external_id()?)
    }

    /// Resolve the referenced template from the cache, best-effort
    ///
    /// Only works if the catalog has already been loaded elsewhere.
    pub fn template(&self, cache: &dyn TemplateCache) -> Option<CatalogTemplate> {
        cache.template(&self.external_id_info()?.id)
    }

    /// The resolved template's icon link, or `None` when unresolved
    pub fn icon(&self, cache: &dyn TemplateCache) -> Option<String> {
        self.template(cache)?.icon_link
    }

    /// The resolved template's categories
    ///
    /// Empty (never absent) when the template does not resolve, so consumers
    /// can iterate unconditionally.
    pub fn categories(&self, cache: &dyn TemplateCache) -> Vec<String> {
        self.template(cache)
            .map(|t| t.categories)
            .unwrap_or_default()
    }
}
