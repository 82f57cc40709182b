//! Error types for stencil-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O failure (directory missing, permission denied, etc.).
    #[error("catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse catalog entity at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The catalog directory does not exist.
    #[error("catalog not found at {path}")]
    CatalogNotFound { path: PathBuf },

    /// Remote catalog rejected or failed the lookup.
    #[error("catalog lookup failed: {0}")]
    Backend(String),
}

/// All errors that can arise from loading `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.stencil/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn catalog_io(path: impl Into<PathBuf>, source: std::io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.into(),
        source,
    }
}
