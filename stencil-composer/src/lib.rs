//! # stencil-composer
//!
//! Deterministic text for template-upgrade pull requests: branch name,
//! commit message, title and body. Text is rendered from embedded Tera
//! templates that a user template directory can override file by file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stencil_composer::PullRequestComposer;
//! use stencil_core::{FileChangeSet, TemplateInfo};
//!
//! fn describe(info: &TemplateInfo, changes: &FileChangeSet) {
//!     if let Ok(composer) = PullRequestComposer::new() {
//!         if let Ok(pr) = composer.compose(info, changes) {
//!             println!("{} -> {}", pr.branch, pr.title);
//!         }
//!     }
//! }
//! ```

pub mod branch;
pub mod engine;
pub mod error;

pub use branch::{branch_name, sanitize_for_branch};
pub use engine::{ComposedPullRequest, PullRequestComposer, TOOL_URL};
pub use error::ComposeError;
