//! Domain types shared by every Stencil crate.
//!
//! Repository paths inside snapshots and change sets are always
//! forward-slash separated strings relative to the repository (or subtree) root.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RepositoryLocation
// ---------------------------------------------------------------------------

/// Normalized identity of a repository (optionally a subtree at a ref) on any host.
///
/// `owner` and `repo` are guaranteed non-empty: [`RepositoryLocation::new`]
/// refuses blank values, and deserialization goes through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LocationFields")]
pub struct RepositoryLocation {
    host: String,
    owner: String,
    repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl RepositoryLocation {
    /// Build a location; `None` when `owner` or `repo` is blank.
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Option<Self> {
        let owner = owner.into().trim().to_string();
        let repo = repo.into().trim().to_string();
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self {
            host: host.into().to_ascii_lowercase(),
            owner,
            repo,
            branch: None,
            path: None,
        })
    }

    /// Attach a ref. Blank refs are ignored.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.branch = (!branch.trim().is_empty()).then_some(branch);
        self
    }

    /// Attach a subtree path. Leading/trailing slashes are stripped; blank paths are ignored.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_matches('/');
        self.path = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// `owner/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Join a snapshot-relative path onto this location's subtree path.
    pub fn repo_path(&self, relative: &str) -> String {
        match &self.path {
            Some(prefix) => format!("{prefix}/{}", relative.trim_start_matches('/')),
            None => relative.trim_start_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct LocationFields {
    host: String,
    owner: String,
    repo: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl TryFrom<LocationFields> for RepositoryLocation {
    type Error = String;

    fn try_from(fields: LocationFields) -> Result<Self, Self::Error> {
        let mut location = RepositoryLocation::new(fields.host, fields.owner, fields.repo)
            .ok_or_else(|| "repository owner and repo must be non-empty".to_string())?;
        if let Some(branch) = fields.branch {
            location = location.with_branch(branch);
        }
        if let Some(path) = fields.path {
            location = location.with_path(path);
        }
        Ok(location)
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.repo)?;
        if let Some(branch) = &self.branch {
            write!(f, "@{branch}")?;
        }
        if let Some(path) = &self.path {
            write!(f, ":{path}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileSnapshot
// ---------------------------------------------------------------------------

/// One point-in-time read of a repository tree: relative path → text content.
///
/// Immutable once built; construct via [`FromIterator`] or [`FileSnapshot::from_map`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    files: BTreeMap<String, String>,
}

impl FileSnapshot {
    pub fn from_map(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FileSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// FileChangeSet
// ---------------------------------------------------------------------------

/// A single proposed change to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "content", rename_all = "lowercase")]
pub enum FileChange {
    /// File does not exist in the target yet.
    Create(String),
    /// File exists and its content should be replaced.
    Update(String),
    /// File should be removed.
    Delete,
}

impl FileChange {
    /// Replacement content, `None` for deletions.
    pub fn content(&self) -> Option<&str> {
        match self {
            FileChange::Create(content) | FileChange::Update(content) => Some(content),
            FileChange::Delete => None,
        }
    }
}

/// Path → change. An empty set means "no drift".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileChangeSet {
    changes: BTreeMap<String, FileChange>,
}

impl FileChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, change: FileChange) {
        self.changes.insert(path.into(), change);
    }

    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.changes.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileChange)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Template / PR metadata
// ---------------------------------------------------------------------------

/// Template metadata threaded read-only into PR composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    /// Owner of the template's source repository.
    pub owner: String,
    /// Name of the template's source repository.
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Template title, falling back to its entity name.
    pub display_name: String,
    /// Empty when unknown.
    pub previous_version: String,
    /// Empty when unknown.
    pub current_version: String,
    /// Name of the scaffolded component receiving the PR.
    pub component_name: String,
}

/// Host-specific reviewer handle (a login, not a numeric id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reviewer(pub String);

impl fmt::Display for Reviewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Reviewer {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A pull/merge request successfully opened on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestResult {
    pub number: u64,
    pub url: String,
}

/// Opaque caller credential forwarded to the catalog. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn secret(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(anonymous)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
