//! # stencil-sync
//!
//! Template drift detection and the batch pipeline that turns drift into
//! pull requests.

pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod template_source;
pub mod variables;

pub use diff::{content_digest, find_common_files, unified_diff, DiffOptions, TemplateDiffEngine};
pub use error::SyncError;
pub use orchestrator::SyncOrchestrator;
pub use report::{FailureStage, Preview, SkipReason, Summary, SyncReport, SyncResult};
pub use retry::RetryPolicy;
pub use template_source::extract_template_source_url;
pub use variables::TemplateVariables;

// Re-exported so callers can build a cancellation token without a direct dependency.
pub use tokio_util::sync::CancellationToken;
