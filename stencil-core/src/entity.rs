//! Catalog entities and entity references.
//!
//! Entities are the metadata documents the catalog hands out (templates,
//! scaffolded components, users, groups). Only the fields Stencil reads are
//! modelled; `spec` stays an untyped JSON value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Annotation pointing at an entity's source tree, e.g. `url:https://github.com/o/r/tree/main/`.
pub const SOURCE_LOCATION_ANNOTATION: &str = "backstage.io/source-location";

/// Namespace used when a reference omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A catalog entity document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub metadata: EntityMetadata,
    #[serde(default)]
    pub spec: Value,
}

/// Entity metadata block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Entity {
    /// Minimal entity, mostly useful for tests and in-memory catalogs.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: "backstage.io/v1alpha1".to_string(),
            kind: kind.into(),
            metadata: EntityMetadata {
                name: name.into(),
                ..EntityMetadata::default()
            },
            spec: Value::Null,
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Fully-qualified reference to this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind.to_ascii_lowercase(),
            namespace: self.namespace().to_string(),
            name: self.metadata.name.clone(),
        }
    }

    /// Title if present, otherwise the entity name.
    pub fn display_name(&self) -> &str {
        self.metadata
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.metadata.name)
    }

    /// `spec.<key>` as a string, when it is one.
    pub fn spec_str(&self, key: &str) -> Option<&str> {
        self.spec.get(key).and_then(Value::as_str)
    }

    /// `spec.owner`.
    pub fn owner(&self) -> Option<&str> {
        self.spec_str("owner").filter(|o| !o.trim().is_empty())
    }

    /// `spec.scaffoldedFrom`: the template this entity was generated from.
    pub fn scaffolded_from(&self) -> Option<&str> {
        self.spec_str("scaffoldedFrom").filter(|o| !o.trim().is_empty())
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// `kind:namespace/name` reference. Kind and namespace compare case-insensitively
/// because they are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

/// Failure to parse an entity reference string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity reference '{0}'")]
pub struct InvalidEntityRef(pub String);

impl EntityRef {
    /// Parse `[kind:][namespace/]name`, using `default_kind` when the kind is omitted.
    pub fn parse(input: &str, default_kind: &str) -> Result<Self, InvalidEntityRef> {
        let trimmed = input.trim();
        let (kind, rest) = match trimmed.split_once(':') {
            Some((kind, rest)) => (kind, rest),
            None => (default_kind, trimmed),
        };
        let (namespace, name) = match rest.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => (DEFAULT_NAMESPACE, rest),
        };
        if kind.is_empty() || namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(InvalidEntityRef(input.to_string()));
        }
        Ok(Self {
            kind: kind.to_ascii_lowercase(),
            namespace: namespace.to_ascii_lowercase(),
            name: name.to_string(),
        })
    }

    /// Whether `entity` is the entity this reference points to.
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.is_kind(&self.kind)
            && entity.namespace().eq_ignore_ascii_case(&self.namespace)
            && entity.metadata.name == self.name
    }
}

impl FromStr for EntityRef {
    type Err = InvalidEntityRef;

    /// Strict form: the kind is mandatory.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(':') {
            return Err(InvalidEntityRef(s.to_string()));
        }
        Self::parse(s, "")
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}
