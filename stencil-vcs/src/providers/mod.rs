//! Concrete host providers and the config-driven registry builder.

mod github;
mod gitlab;

use std::sync::Arc;

use stencil_composer::PullRequestComposer;
use stencil_core::config::HostIntegration;
use stencil_core::Config;
use url::Url;

pub use github::GithubProvider;
pub use gitlab::GitlabProvider;

use crate::credentials::CredentialsProvider;
use crate::error::HostError;
use crate::registry::VcsProviderRegistry;

/// Register one provider per configured integration: GitHub hosts first,
/// then GitLab. Empty lists fall back to `github.com` / `gitlab.com`.
pub fn registry_from_config(
    config: &Config,
    credentials: Arc<dyn CredentialsProvider>,
    composer: Arc<PullRequestComposer>,
) -> Result<VcsProviderRegistry, HostError> {
    let default_branch = config.sync.default_branch.as_str();
    let mut registry = VcsProviderRegistry::new();

    for integration in or_default(&config.integrations.github, "github.com") {
        let provider = GithubProvider::from_integration(
            &integration,
            Arc::clone(&credentials),
            Arc::clone(&composer),
        )?
        .with_default_branch(default_branch);
        registry.register_provider(Arc::new(provider));
    }
    for integration in or_default(&config.integrations.gitlab, "gitlab.com") {
        let provider = GitlabProvider::from_integration(
            &integration,
            Arc::clone(&credentials),
            Arc::clone(&composer),
        )?
        .with_default_branch(default_branch);
        registry.register_provider(Arc::new(provider));
    }
    Ok(registry)
}

fn or_default(list: &[HostIntegration], host: &str) -> Vec<HostIntegration> {
    if list.is_empty() {
        vec![HostIntegration::new(host)]
    } else {
        list.to_vec()
    }
}

// ---------------------------------------------------------------------------
// URL helpers shared by providers
// ---------------------------------------------------------------------------

/// Drop surrounding whitespace and the catalog's `url:` location prefix.
pub(crate) fn strip_location_prefix(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("url:").unwrap_or(url).trim()
}

/// Lowercased host plus non-empty path segments.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct UrlParts {
    pub host: String,
    pub segments: Vec<String>,
}

/// Split an https / ssh URL or an scp-style `git@host:owner/repo.git`.
pub(crate) fn split_url(url: &str) -> Option<UrlParts> {
    let url = strip_location_prefix(url);
    if url.is_empty() {
        return None;
    }
    if !url.contains("://") {
        let (user_host, path) = url.split_once(':')?;
        let host = user_host.rsplit('@').next()?.trim();
        if host.is_empty() || host.contains('/') {
            return None;
        }
        return Some(UrlParts {
            host: host.to_ascii_lowercase(),
            segments: segments(path.split('/')),
        });
    }
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https" | "ssh" | "git+ssh" | "git") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    let segments = segments(parsed.path_segments()?);
    Some(UrlParts { host, segments })
}

fn segments<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    raw.filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Repository name without a trailing `.git`.
pub(crate) fn trim_git_suffix(repo: &str) -> &str {
    repo.strip_suffix(".git").unwrap_or(repo)
}

/// `path` relative to `subtree`, or `None` when it lies outside it.
pub(crate) fn relative_to(subtree: Option<&str>, path: String) -> Option<String> {
    match subtree {
        None => Some(path),
        Some(prefix) => path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string),
    }
}
