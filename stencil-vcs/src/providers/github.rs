//! GitHub (github.com and Enterprise) over REST v3.
//!
//! Pull requests are built with the git data API so that a whole change set
//! lands in one commit: base ref → base commit → new tree → commit → branch
//! ref → pull → requested reviewers.
//!
//! Submission is resumable: a branch that already holds the same tree, or an
//! open pull request already raised from it, is picked up instead of failing.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use stencil_composer::PullRequestComposer;
use stencil_core::config::HostIntegration;
use stencil_core::entity::SOURCE_LOCATION_ANNOTATION;
use stencil_core::{
    Catalog, Credential, Entity, FileChange, FileChangeSet, PullRequestResult,
    RepositoryLocation, Reviewer, TemplateInfo,
};

use super::{relative_to, split_url, strip_location_prefix, trim_git_suffix};
use crate::credentials::CredentialsProvider;
use crate::error::{HostError, SubmissionError};
use crate::http::{AuthScheme, HostClient};
use crate::provider::{owner_login, TreeReader, VcsProvider};

const NAME: &str = "github";
const PUBLIC_HOST: &str = "github.com";
const PUBLIC_API: &str = "https://api.github.com";

pub const PROJECT_SLUG_ANNOTATION: &str = "github.com/project-slug";
pub const USER_LOGIN_ANNOTATION: &str = "github.com/user-login";

const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const FILE_MODE: &str = "100644";

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: Sha,
}

#[derive(Deserialize)]
struct Commit {
    sha: String,
    tree: Sha,
}

#[derive(Deserialize)]
struct CreatedPull {
    number: u64,
    html_url: String,
}

pub struct GithubProvider {
    host: String,
    client: HostClient,
    credentials: Arc<dyn CredentialsProvider>,
    composer: Arc<PullRequestComposer>,
    default_branch: String,
}

impl GithubProvider {
    /// `api_base` defaults to `api.github.com` for the public host and
    /// `https://<host>/api/v3` for Enterprise.
    pub fn new(
        host: &str,
        api_base: Option<&str>,
        fallback_token: Option<String>,
        credentials: Arc<dyn CredentialsProvider>,
        composer: Arc<PullRequestComposer>,
    ) -> Result<Self, HostError> {
        let host = host.trim().to_ascii_lowercase();
        let api_base = match api_base {
            Some(base) => base.to_string(),
            None if host == PUBLIC_HOST => PUBLIC_API.to_string(),
            None => format!("https://{host}/api/v3"),
        };
        Ok(Self {
            client: HostClient::new(&api_base, AuthScheme::Bearer, fallback_token)?,
            host,
            credentials,
            composer,
            default_branch: "main".to_string(),
        })
    }

    pub fn from_integration(
        integration: &HostIntegration,
        credentials: Arc<dyn CredentialsProvider>,
        composer: Arc<PullRequestComposer>,
    ) -> Result<Self, HostError> {
        Self::new(
            &integration.host,
            integration.api_base_url.as_deref(),
            integration.resolve_token(),
            credentials,
            composer,
        )
    }

    /// Branch used when building URLs from `github.com/project-slug`.
    pub fn with_default_branch(mut self, branch: &str) -> Self {
        if !branch.trim().is_empty() {
            self.default_branch = branch.trim().to_string();
        }
        self
    }

    async fn token_for(&self, url: &str) -> Option<String> {
        self.client.token(self.credentials.token_for_url(url).await)
    }

    fn web_url(&self, location: &RepositoryLocation) -> String {
        format!("https://{}/{}", self.host, location.slug())
    }

    fn repo_endpoint<'a>(
        &self,
        location: &'a RepositoryLocation,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> url::Url {
        self.client.endpoint(
            ["repos", location.owner(), location.repo()]
                .into_iter()
                .chain(rest),
        )
    }

    async fn resolve_ref(
        &self,
        location: &RepositoryLocation,
        token: Option<&str>,
    ) -> Result<String, HostError> {
        if let Some(branch) = location.branch() {
            return Ok(branch.to_string());
        }
        let url = self.repo_endpoint(location, std::iter::empty());
        let repo: RepoInfo = self.client.get_json(&url, token).await?;
        Ok(repo.default_branch)
    }

    /// Tree of the head commit on `branch`, or `None` if the branch is absent.
    async fn branch_tree(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        token: &str,
    ) -> Result<Option<String>, HostError> {
        let ref_url = self.repo_endpoint(
            location,
            ["git", "ref", "heads"].into_iter().chain(branch.split('/')),
        );
        let head: GitRef = match self.client.get_json(&ref_url, Some(token)).await {
            Ok(head) => head,
            Err(HostError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let commit_url = self.repo_endpoint(location, ["git", "commits", head.object.sha.as_str()]);
        let commit: Commit = self.client.get_json(&commit_url, Some(token)).await?;
        Ok(Some(commit.tree.sha))
    }

    async fn open_pull_for(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        token: &str,
    ) -> Result<Option<CreatedPull>, HostError> {
        let mut url = self.repo_endpoint(location, ["pulls"]);
        url.query_pairs_mut()
            .append_pair("head", &format!("{}:{branch}", location.owner()))
            .append_pair("state", "open");
        let pulls: Vec<CreatedPull> = self.client.get_json(&url, Some(token)).await?;
        Ok(pulls.into_iter().next())
    }

    async fn request_review(
        &self,
        location: &RepositoryLocation,
        number: u64,
        reviewer: &Reviewer,
        token: &str,
    ) {
        let number = number.to_string();
        let url = self.repo_endpoint(location, ["pulls", number.as_str(), "requested_reviewers"]);
        let body = json!({ "reviewers": [reviewer.0] });
        match self
            .client
            .send_discarding(Method::POST, &url, Some(token), &body)
            .await
        {
            Ok(()) => tracing::debug!(repository = %location.slug(), %reviewer, "requested review"),
            Err(err) => tracing::warn!(
                repository = %location.slug(),
                %reviewer,
                %err,
                "failed to request review; pull request left without reviewer"
            ),
        }
    }
}

fn tree_items(location: &RepositoryLocation, changes: &FileChangeSet) -> Vec<Value> {
    changes
        .iter()
        .map(|(path, change)| {
            let path = location.repo_path(path);
            match change {
                FileChange::Create(content) | FileChange::Update(content) => json!({
                    "path": path,
                    "mode": FILE_MODE,
                    "type": "blob",
                    "content": content,
                }),
                FileChange::Delete => json!({
                    "path": path,
                    "mode": FILE_MODE,
                    "type": "blob",
                    "sha": Value::Null,
                }),
            }
        })
        .collect()
}

#[async_trait]
impl TreeReader for GithubProvider {
    async fn list_files(&self, location: &RepositoryLocation) -> Result<Vec<String>, HostError> {
        let token = self.token_for(&self.web_url(location)).await;
        let reference = self.resolve_ref(location, token.as_deref()).await?;
        let mut url = self.repo_endpoint(
            location,
            ["git", "trees"].into_iter().chain(reference.split('/')),
        );
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: Tree = self.client.get_json(&url, token.as_deref()).await?;
        if tree.truncated {
            tracing::warn!(%location, "GitHub truncated the tree listing; some files are missing");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter_map(|entry| relative_to(location.path(), entry.path))
            .collect())
    }

    async fn read_file(
        &self,
        location: &RepositoryLocation,
        path: &str,
    ) -> Result<Vec<u8>, HostError> {
        let token = self.token_for(&self.web_url(location)).await;
        let repo_path = location.repo_path(path);
        let mut url = self.repo_endpoint(
            location,
            std::iter::once("contents").chain(repo_path.split('/')),
        );
        if let Some(branch) = location.branch() {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        self.client
            .get_raw(&url, token.as_deref(), RAW_MEDIA_TYPE)
            .await
    }
}

#[async_trait]
impl VcsProvider for GithubProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn can_handle(&self, url: &str) -> bool {
        split_url(url).is_some_and(|parts| parts.host == self.host)
    }

    /// `https://<host>/<owner>/<repo>[.git][/(tree|blob)/<ref>[/<path>]]` or
    /// `git@<host>:<owner>/<repo>.git`.
    fn parse_url(&self, url: &str) -> Option<RepositoryLocation> {
        let parts = split_url(url)?;
        if parts.host != self.host {
            return None;
        }
        let mut segments = parts.segments.into_iter();
        let owner = segments.next()?;
        let repo = segments.next()?;
        let location = RepositoryLocation::new(&self.host, owner, trim_git_suffix(&repo))?;
        let rest: Vec<String> = segments.collect();
        Some(match rest.as_slice() {
            [kind, reference, path @ ..] if kind == "tree" || kind == "blob" => location
                .with_branch(reference.as_str())
                .with_path(path.join("/")),
            _ => location,
        })
    }

    fn extract_repo_url(&self, entity: &Entity) -> Option<String> {
        if let Some(source) = entity.annotation(SOURCE_LOCATION_ANNOTATION) {
            let source = strip_location_prefix(source);
            if self.parse_url(source).is_some() {
                return Some(source.to_string());
            }
        }
        let slug = entity.annotation(PROJECT_SLUG_ANNOTATION)?.trim();
        let (owner, repo) = slug.split_once('/')?;
        let (owner, repo) = (owner.trim(), repo.trim());
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(format!(
            "https://{}/{owner}/{repo}/tree/{}",
            self.host, self.default_branch
        ))
    }

    async fn reviewer_for_owner(
        &self,
        entity: &Entity,
        catalog: &dyn Catalog,
        credential: &Credential,
    ) -> Option<Reviewer> {
        owner_login(entity, catalog, credential, USER_LOGIN_ANNOTATION).await
    }

    async fn create_pull_request(
        &self,
        target_url: &str,
        changes: &FileChangeSet,
        info: &TemplateInfo,
        reviewer: Option<&Reviewer>,
    ) -> Result<PullRequestResult, SubmissionError> {
        let location = self
            .parse_url(target_url)
            .ok_or_else(|| SubmissionError::InvalidUrl {
                url: target_url.to_string(),
            })?;
        if changes.is_empty() {
            return Err(SubmissionError::EmptyChangeSet);
        }
        let token = self
            .token_for(target_url)
            .await
            .ok_or_else(|| SubmissionError::MissingCredentials {
                url: target_url.to_string(),
            })?;
        let token = token.as_str();
        let composed = self.composer.compose(info, changes)?;
        let base = self.resolve_ref(&location, Some(token)).await?;

        let ref_url = self.repo_endpoint(
            &location,
            ["git", "ref", "heads"].into_iter().chain(base.split('/')),
        );
        let base_ref: GitRef = self.client.get_json(&ref_url, Some(token)).await?;
        let base_sha = base_ref.object.sha;

        let commit_url = self.repo_endpoint(&location, ["git", "commits", base_sha.as_str()]);
        let base_commit: Commit = self.client.get_json(&commit_url, Some(token)).await?;

        let trees_url = self.repo_endpoint(&location, ["git", "trees"]);
        let tree: Sha = self
            .client
            .send_json(
                Method::POST,
                &trees_url,
                Some(token),
                &json!({ "base_tree": base_commit.tree.sha, "tree": tree_items(&location, changes) }),
            )
            .await?;

        let commits_url = self.repo_endpoint(&location, ["git", "commits"]);
        let commit: Sha = self
            .client
            .send_json(
                Method::POST,
                &commits_url,
                Some(token),
                &json!({
                    "message": composed.commit_message,
                    "tree": tree.sha,
                    "parents": [base_commit.sha],
                }),
            )
            .await?;

        let refs_url = self.repo_endpoint(&location, ["git", "refs"]);
        let created_ref: Result<Value, HostError> = self
            .client
            .send_json(
                Method::POST,
                &refs_url,
                Some(token),
                &json!({ "ref": format!("refs/heads/{}", composed.branch), "sha": commit.sha }),
            )
            .await;
        match created_ref {
            Ok(_) => {}
            Err(HostError::Status { status: 422, .. }) => {
                let existing = self.branch_tree(&location, &composed.branch, token).await?;
                if existing.as_deref() != Some(tree.sha.as_str()) {
                    return Err(SubmissionError::BranchExists {
                        repository: location.slug(),
                        branch: composed.branch,
                    });
                }
                tracing::debug!(
                    repository = %location.slug(),
                    branch = %composed.branch,
                    "branch already holds this change set, resuming"
                );
            }
            Err(err) => return Err(err.into()),
        }

        let pulls_url = self.repo_endpoint(&location, ["pulls"]);
        let created_pull: Result<CreatedPull, HostError> = self
            .client
            .send_json(
                Method::POST,
                &pulls_url,
                Some(token),
                &json!({
                    "title": composed.title,
                    "body": composed.body,
                    "head": composed.branch,
                    "base": base,
                }),
            )
            .await;
        let pull = match created_pull {
            Ok(pull) => pull,
            Err(err @ HostError::Status { status: 422, .. }) => {
                match self.open_pull_for(&location, &composed.branch, token).await? {
                    Some(pull) => pull,
                    None => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            repository = %location.slug(),
            number = pull.number,
            url = %pull.html_url,
            files = changes.len(),
            "opened pull request"
        );

        if let Some(reviewer) = reviewer {
            self.request_review(&location, pull.number, reviewer, token).await;
        }

        Ok(PullRequestResult {
            number: pull.number,
            url: pull.html_url,
        })
    }
}
