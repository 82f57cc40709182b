//! Stencil core library: domain types, catalog access, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: repository locations, file snapshots, change sets, template info
//! - [`entity`]: catalog entities and entity references
//! - [`catalog`]: the [`Catalog`] lookup contract plus file-backed and in-memory catalogs
//! - [`config`]: `~/.stencil/config.yaml` load
//! - [`error`]: [`CatalogError`], [`ConfigError`]

pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod types;

pub use catalog::{Catalog, FileCatalog, InMemoryCatalog};
pub use config::Config;
pub use entity::{Entity, EntityMetadata, EntityRef};
pub use error::{CatalogError, ConfigError};
pub use types::{
    Credential, FileChange, FileChangeSet, FileSnapshot, PullRequestResult, RepositoryLocation,
    Reviewer, TemplateInfo,
};
