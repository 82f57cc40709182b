//! Catalog lookup contract and the two bundled implementations.
//!
//! # Storage layout ([`FileCatalog`])
//!
//! ```text
//! <catalog_dir>/
//!   templates/web-app.yaml     (one or more `---`-separated entity documents)
//!   components/payments.yaml
//!   users.yml
//! ```
//!
//! Every `*.yaml` / `*.yml` file under the directory is read recursively in
//! sorted order, so lookups that match several documents are deterministic
//! (first file, first document wins).
//!
//! # API pattern
//!
//! Path helpers come in two forms, as elsewhere in Stencil:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::entity::{Entity, EntityRef};
use crate::error::{catalog_io, CatalogError, ConfigError};
use crate::types::Credential;

/// Entity metadata source.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up one entity. `Ok(None)` when it does not exist.
    async fn entity_by_ref(
        &self,
        entity_ref: &EntityRef,
        credential: &Credential,
    ) -> Result<Option<Entity>, CatalogError>;

    /// Entities whose `spec.scaffoldedFrom` points at `template`.
    async fn scaffolded_from(
        &self,
        template: &EntityRef,
        credential: &Credential,
    ) -> Result<Vec<Entity>, CatalogError>;
}

// ---------------------------------------------------------------------------
// InMemoryCatalog
// ---------------------------------------------------------------------------

/// Catalog over a fixed list of entities.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entities: Vec<Entity>,
}

impl InMemoryCatalog {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn find(&self, entity_ref: &EntityRef) -> Option<&Entity> {
        self.entities.iter().find(|e| entity_ref.matches(e))
    }

    fn find_scaffolded_from(&self, template: &EntityRef) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| {
                e.scaffolded_from()
                    .and_then(|r| EntityRef::parse(r, "template").ok())
                    .is_some_and(|r| &r == template)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn entity_by_ref(
        &self,
        entity_ref: &EntityRef,
        _credential: &Credential,
    ) -> Result<Option<Entity>, CatalogError> {
        Ok(self.find(entity_ref).cloned())
    }

    async fn scaffolded_from(
        &self,
        template: &EntityRef,
        _credential: &Credential,
    ) -> Result<Vec<Entity>, CatalogError> {
        Ok(self.find_scaffolded_from(template))
    }
}

// ---------------------------------------------------------------------------
// FileCatalog
// ---------------------------------------------------------------------------

/// Catalog loaded once from a directory of YAML entity documents.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
    inner: InMemoryCatalog,
}

impl FileCatalog {
    /// Load every entity document under `dir`.
    ///
    /// Returns `CatalogError::CatalogNotFound` if `dir` is absent,
    /// `CatalogError::Parse` (with path + line context) on malformed YAML.
    pub fn load_at(dir: &Path) -> Result<Self, CatalogError> {
        if !dir.exists() {
            return Err(CatalogError::CatalogNotFound {
                path: dir.to_path_buf(),
            });
        }
        let mut files = Vec::new();
        collect_yaml_files(dir, &mut files)?;
        files.sort();

        let mut entities = Vec::new();
        for path in files {
            entities.extend(load_documents(&path)?);
        }
        tracing::debug!("loaded {} catalog entities from {}", entities.len(), dir.display());
        Ok(Self {
            root: dir.to_path_buf(),
            inner: InMemoryCatalog::new(entities),
        })
    }

    /// Load `<home>/.stencil/catalog` (convenience: uses `dirs::home_dir()`).
    pub fn load() -> Result<Self, CatalogError> {
        let home = dirs::home_dir().ok_or_else(|| {
            CatalogError::Backend(ConfigError::HomeNotFound.to_string())
        })?;
        Self::load_at(&default_dir_at(&home))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entities(&self) -> &[Entity] {
        self.inner.entities()
    }
}

#[async_trait]
impl Catalog for FileCatalog {
    async fn entity_by_ref(
        &self,
        entity_ref: &EntityRef,
        credential: &Credential,
    ) -> Result<Option<Entity>, CatalogError> {
        self.inner.entity_by_ref(entity_ref, credential).await
    }

    async fn scaffolded_from(
        &self,
        template: &EntityRef,
        credential: &Credential,
    ) -> Result<Vec<Entity>, CatalogError> {
        self.inner.scaffolded_from(template, credential).await
    }
}

/// `<home>/.stencil/catalog`: pure, no I/O.
pub fn default_dir_at(home: &Path) -> PathBuf {
    home.join(".stencil").join("catalog")
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|e| catalog_io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| catalog_io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| catalog_io(&path, e))?;
        if file_type.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if file_type.is_file()
            && matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("yaml") | Some("yml")
            )
        {
            out.push(path);
        }
    }
    Ok(())
}

fn load_documents(path: &Path) -> Result<Vec<Entity>, CatalogError> {
    let contents = std::fs::read_to_string(path).map_err(|e| catalog_io(path, e))?;
    let mut entities = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&contents) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| CatalogError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if value.is_null() {
            continue;
        }
        let entity: Entity = serde_yaml::from_value(value).map_err(|e| CatalogError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        entities.push(entity);
    }
    Ok(entities)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
