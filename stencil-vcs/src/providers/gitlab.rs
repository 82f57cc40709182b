//! GitLab (gitlab.com and self-managed) over REST v4.
//!
//! One commits-API call carries every file action onto a new branch, then a
//! merge request is opened and the reviewer is set on it.
//!
//! A rerun after a partial submission picks up the branch when its head is
//! our commit, and an open merge request already raised from it.

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

const NAME: &str = "gitlab";

pub const PROJECT_SLUG_ANNOTATION: &str = "gitlab.com/project-slug";
pub const USER_LOGIN_ANNOTATION: &str = "gitlab.com/user-login";

const PAGE_SIZE: &str = "100";

#[derive(Deserialize)]
struct Project {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct MergeRequest {
    iid: u64,
    web_url: String,
}

#[derive(Deserialize)]
struct Branch {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct User {
    id: u64,
}

pub struct GitlabProvider {
    host: String,
    client: HostClient,
    credentials: Arc<dyn CredentialsProvider>,
    composer: Arc<PullRequestComposer>,
    default_branch: String,
}

impl GitlabProvider {
    /// `api_base` defaults to `https://<host>/api/v4`.
    pub fn new(
        host: &str,
        api_base: Option<&str>,
        fallback_token: Option<String>,
        credentials: Arc<dyn CredentialsProvider>,
        composer: Arc<PullRequestComposer>,
    ) -> Result<Self, HostError> {
        let host = host.trim().to_ascii_lowercase();
        let api_base = api_base
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://{host}/api/v4"));
        Ok(Self {
            client: HostClient::new(&api_base, AuthScheme::PrivateToken, fallback_token)?,
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

    /// Branch used when building URLs from `gitlab.com/project-slug`.
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

    /// `projects/<url-encoded namespace/repo>/<rest>`.
    fn project_endpoint<'a>(
        &self,
        location: &RepositoryLocation,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> url::Url {
        let head = ["projects".to_string(), location.slug()];
        self.client
            .endpoint(head.into_iter().chain(rest.into_iter().map(str::to_string)))
    }

    async fn resolve_ref(
        &self,
        location: &RepositoryLocation,
        token: Option<&str>,
    ) -> Result<String, HostError> {
        if let Some(branch) = location.branch() {
            return Ok(branch.to_string());
        }
        let url = self.project_endpoint(location, std::iter::empty());
        let project: Project = self.client.get_json(&url, token).await?;
        Ok(project.default_branch)
    }

    /// Message of the head commit on `branch`, or `None` if the branch is absent.
    async fn branch_head_message(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        token: &str,
    ) -> Result<Option<String>, HostError> {
        let url = self.project_endpoint(location, ["repository", "branches", branch]);
        match self.client.get_json::<Branch>(&url, Some(token)).await {
            Ok(found) => Ok(Some(found.commit.message)),
            Err(HostError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn open_merge_request_for(
        &self,
        location: &RepositoryLocation,
        branch: &str,
        token: &str,
    ) -> Result<Option<MergeRequest>, HostError> {
        let mut url = self.project_endpoint(location, ["merge_requests"]);
        url.query_pairs_mut()
            .append_pair("source_branch", branch)
            .append_pair("state", "opened");
        let open: Vec<MergeRequest> = self.client.get_json(&url, Some(token)).await?;
        Ok(open.into_iter().next())
    }

    async fn user_id(&self, login: &str, token: &str) -> Result<Option<u64>, HostError> {
        let mut url = self.client.endpoint(["users"]);
        url.query_pairs_mut().append_pair("username", login);
        let users: Vec<User> = self.client.get_json(&url, Some(token)).await?;
        Ok(users.first().map(|u| u.id))
    }

    async fn set_reviewer(
        &self,
        location: &RepositoryLocation,
        iid: u64,
        reviewer: &Reviewer,
        token: &str,
    ) {
        let id = match self.user_id(&reviewer.0, token).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!(%reviewer, host = %self.host, "reviewer login not found on host");
                return;
            }
            Err(err) => {
                tracing::warn!(%reviewer, %err, "failed to look up reviewer");
                return;
            }
        };
        let iid = iid.to_string();
        let url = self.project_endpoint(location, ["merge_requests", iid.as_str()]);
        let body = json!({ "reviewer_ids": [id] });
        match self
            .client
            .send_discarding(Method::PUT, &url, Some(token), &body)
            .await
        {
            Ok(()) => tracing::debug!(repository = %location.slug(), %reviewer, "requested review"),
            Err(err) => tracing::warn!(
                repository = %location.slug(),
                %reviewer,
                %err,
                "failed to set reviewer; merge request left without reviewer"
            ),
        }
    }
}

fn commit_actions(location: &RepositoryLocation, changes: &FileChangeSet) -> Vec<Value> {
    changes
        .iter()
        .map(|(path, change)| {
            let file_path = location.repo_path(path);
            match change {
                FileChange::Create(content) => {
                    json!({ "action": "create", "file_path": file_path, "content": content })
                }
                FileChange::Update(content) => {
                    json!({ "action": "update", "file_path": file_path, "content": content })
                }
                FileChange::Delete => json!({ "action": "delete", "file_path": file_path }),
            }
        })
        .collect()
}

#[async_trait]
impl TreeReader for GitlabProvider {
    async fn list_files(&self, location: &RepositoryLocation) -> Result<Vec<String>, HostError> {
        let token = self.token_for(&self.web_url(location)).await;
        let reference = self.resolve_ref(location, token.as_deref()).await?;
        let mut files = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut url = self.project_endpoint(location, ["repository", "tree"]);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("recursive", "true")
                    .append_pair("per_page", PAGE_SIZE)
                    .append_pair("page", &page.to_string())
                    .append_pair("ref", &reference);
                if let Some(path) = location.path() {
                    query.append_pair("path", path);
                }
            }
            let (entries, next): (Vec<TreeEntry>, Option<u32>) =
                self.client.get_json_page(&url, token.as_deref()).await?;
            files.extend(
                entries
                    .into_iter()
                    .filter(|entry| entry.kind == "blob")
                    .filter_map(|entry| relative_to(location.path(), entry.path)),
            );
            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }
        Ok(files)
    }

    async fn read_file(
        &self,
        location: &RepositoryLocation,
        path: &str,
    ) -> Result<Vec<u8>, HostError> {
        let token = self.token_for(&self.web_url(location)).await;
        let file_path = location.repo_path(path);
        let mut url = self.project_endpoint(
            location,
            ["repository", "files", file_path.as_str(), "raw"],
        );
        if let Some(branch) = location.branch() {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        self.client
            .get_raw(&url, token.as_deref(), "*/*")
            .await
    }
}

#[async_trait]
impl VcsProvider for GitlabProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn can_handle(&self, url: &str) -> bool {
        split_url(url).is_some_and(|parts| parts.host == self.host)
    }

    /// `https://<host>/<namespace...>/<repo>[.git][/-/(tree|blob)/<ref>[/<path>]]`
    /// or `git@<host>:<namespace>/<repo>.git`. Nested groups stay in the owner.
    fn parse_url(&self, url: &str) -> Option<RepositoryLocation> {
        let parts = split_url(url)?;
        if parts.host != self.host {
            return None;
        }
        let segments = parts.segments;
        let (project, rest) = match segments.iter().position(|s| s == "-") {
            Some(i) => (&segments[..i], &segments[i + 1..]),
            None => (&segments[..], &[][..]),
        };
        let (repo, namespace) = project.split_last()?;
        if namespace.is_empty() {
            return None;
        }
        let location =
            RepositoryLocation::new(&self.host, namespace.join("/"), trim_git_suffix(repo))?;
        Some(match rest {
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
        let slug = entity.annotation(PROJECT_SLUG_ANNOTATION)?.trim().trim_matches('/');
        let (namespace, repo) = slug.rsplit_once('/')?;
        if namespace.trim().is_empty() || repo.trim().is_empty() {
            return None;
        }
        Some(format!(
            "https://{}/{slug}/-/tree/{}",
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

        let commits_url = self.project_endpoint(&location, ["repository", "commits"]);
        let committed: Result<Value, HostError> = self
            .client
            .send_json(
                Method::POST,
                &commits_url,
                Some(token),
                &json!({
                    "branch": composed.branch,
                    "start_branch": base,
                    "commit_message": composed.commit_message,
                    "actions": commit_actions(&location, changes),
                }),
            )
            .await;
        match committed {
            Ok(_) => {}
            Err(HostError::Status {
                status: 400,
                message,
                ..
            }) if message.contains("already exists") => {
                let head = self
                    .branch_head_message(&location, &composed.branch, token)
                    .await?;
                if head.as_deref().map(str::trim) != Some(composed.commit_message.trim()) {
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

        let mr_url = self.project_endpoint(&location, ["merge_requests"]);
        let opened: Result<MergeRequest, HostError> = self
            .client
            .send_json(
                Method::POST,
                &mr_url,
                Some(token),
                &json!({
                    "source_branch": composed.branch,
                    "target_branch": base,
                    "title": composed.title,
                    "description": composed.body,
                    "remove_source_branch": true,
                }),
            )
            .await;
        let mr = match opened {
            Ok(mr) => mr,
            Err(err @ HostError::Status { status: 409, .. }) => {
                match self
                    .open_merge_request_for(&location, &composed.branch, token)
                    .await?
                {
                    Some(mr) => mr,
                    None => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            repository = %location.slug(),
            number = mr.iid,
            url = %mr.web_url,
            files = changes.len(),
            "opened merge request"
        );

        if let Some(reviewer) = reviewer {
            self.set_reviewer(&location, mr.iid, reviewer, token).await;
        }

        Ok(PullRequestResult {
            number: mr.iid,
            url: mr.web_url,
        })
    }
}
