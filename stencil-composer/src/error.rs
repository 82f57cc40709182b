//! Error types for stencil-composer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from composing pull request text.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}
