//! Tera composition engine: [`PullRequestComposer`].
//!
//! | Template                | Produces                      |
//! |-------------------------|-------------------------------|
//! | `commit_message.tera`   | commit message                |
//! | `pr_title.tera`         | pull request title (one line) |
//! | `pr_body.tera`          | pull request body (markdown)  |
//!
//! Files with the same names in a user template directory replace the
//! embedded defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};

use stencil_core::{FileChange, FileChangeSet, TemplateInfo};

use crate::branch::branch_name;
use crate::error::ComposeError;

/// Linked from every PR body.
pub const TOOL_URL: &str = "https://github.com/stencil-dev/stencil";

const COMMIT_MESSAGE: &str = "commit_message.tera";
const PR_TITLE: &str = "pr_title.tera";
const PR_BODY: &str = "pr_body.tera";

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    (COMMIT_MESSAGE, include_str!("templates/commit_message.tera")),
    (PR_TITLE, include_str!("templates/pr_title.tera")),
    (PR_BODY, include_str!("templates/pr_body.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ComposeError {
    ComposeError::Io { path: path.into(), source }
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, ComposeError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    for (name, _) in TPLS {
        let path = dir.join(name);
        if !path.is_file() {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name.to_string(), contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, ComposeError> {
    let mut templates: HashMap<String, String> = TPLS
        .iter()
        .map(|(name, content)| (name.to_string(), content.to_string()))
        .collect();
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ComposeContext<'a> {
    owner: &'a str,
    repo: &'a str,
    display_name: &'a str,
    previous_version: &'a str,
    current_version: &'a str,
    component_name: &'a str,
    file_count: usize,
    files: Vec<FileEntry<'a>>,
    tool_url: &'static str,
}

#[derive(Debug, Serialize)]
struct FileEntry<'a> {
    path: &'a str,
    action: &'static str,
}

impl<'a> ComposeContext<'a> {
    fn new(info: &'a TemplateInfo, changes: &'a FileChangeSet) -> Self {
        let files = changes
            .iter()
            .map(|(path, change)| FileEntry {
                path,
                action: match change {
                    FileChange::Create(_) => "added",
                    FileChange::Update(_) => "updated",
                    FileChange::Delete => "deleted",
                },
            })
            .collect();
        Self {
            owner: &info.owner,
            repo: &info.repo,
            display_name: &info.display_name,
            previous_version: info.previous_version.trim(),
            current_version: info.current_version.trim(),
            component_name: &info.component_name,
            file_count: changes.len(),
            files,
            tool_url: TOOL_URL,
        }
    }
}

// ---------------------------------------------------------------------------
// PullRequestComposer
// ---------------------------------------------------------------------------

/// Everything a host needs to open the pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPullRequest {
    pub branch: String,
    pub title: String,
    pub body: String,
    pub commit_message: String,
}

/// Builds PR text from [`TemplateInfo`] and the change set. Create once and reuse.
pub struct PullRequestComposer {
    tera: Tera,
}

impl PullRequestComposer {
    /// Composer using embedded templates only.
    pub fn new() -> Result<Self, ComposeError> {
        Self::with_overrides(None)
    }

    /// Composer whose templates may be overridden from `user_template_dir`.
    pub fn with_overrides(user_template_dir: Option<&Path>) -> Result<Self, ComposeError> {
        Ok(Self {
            tera: build_tera(user_template_dir)?,
        })
    }

    pub fn compose(
        &self,
        info: &TemplateInfo,
        changes: &FileChangeSet,
    ) -> Result<ComposedPullRequest, ComposeError> {
        let ctx = Context::from_serialize(ComposeContext::new(info, changes))?;
        let title = self.tera.render(PR_TITLE, &ctx)?;
        Ok(ComposedPullRequest {
            branch: branch_name(info),
            title: title.lines().next().unwrap_or_default().trim().to_string(),
            body: self.tera.render(PR_BODY, &ctx)?.trim_end().to_string(),
            commit_message: self.tera.render(COMMIT_MESSAGE, &ctx)?.trim_end().to_string(),
        })
    }
}
