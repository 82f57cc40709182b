use stencil_core::CatalogError;
use stencil_vcs::FetchError;
use thiserror::Error;

/// Run-level failures. Any of these ends the whole template run; per-target
/// problems are recorded in the report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("template {template} not found in catalog")]
    TemplateNotFound { template: String },

    #[error("catalog lookup for {entity} failed: {source}")]
    Catalog {
        entity: String,
        #[source]
        source: CatalogError,
    },

    #[error("template {template} has no fetch:template step with a url")]
    NoFetchStep { template: String },

    #[error("cannot resolve skeleton url {url} for template {template}")]
    UnresolvedTemplateUrl { template: String, url: String },

    #[error("no provider handles template url {url}")]
    NoTemplateProvider { url: String },

    #[error("failed to fetch template files: {0}")]
    TemplateFetch(#[from] FetchError),
}
