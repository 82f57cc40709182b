//! Token lookup for repository URLs.

use std::collections::HashMap;

use async_trait::async_trait;
use stencil_core::config::IntegrationsConfig;

use crate::providers::split_url;

/// Supplies a host token for a repository URL; `None` means anonymous access.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn token_for_url(&self, url: &str) -> Option<String>;
}

/// Tokens from `integrations.*` in the config file, keyed by host.
#[derive(Default)]
pub struct ConfigCredentials {
    by_host: HashMap<String, String>,
}

impl ConfigCredentials {
    /// Resolve every integration's token once (inline value, then environment).
    pub fn from_config(integrations: &IntegrationsConfig) -> Self {
        let by_host = integrations
            .github
            .iter()
            .chain(integrations.gitlab.iter())
            .filter_map(|i| Some((i.host.trim().to_ascii_lowercase(), i.resolve_token()?)))
            .collect();
        Self { by_host }
    }

    pub fn token_for_host(&self, host: &str) -> Option<&str> {
        self.by_host
            .get(&host.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl std::fmt::Debug for ConfigCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hosts: Vec<_> = self.by_host.keys().collect();
        hosts.sort();
        f.debug_struct("ConfigCredentials").field("hosts", &hosts).finish()
    }
}

#[async_trait]
impl CredentialsProvider for ConfigCredentials {
    async fn token_for_url(&self, url: &str) -> Option<String> {
        let host = split_url(url)?.host;
        self.token_for_host(&host).map(str::to_string)
    }
}

/// The same token (or none) for every URL.
#[derive(Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = if self.0.is_some() { "<redacted>" } else { "<none>" };
        f.debug_tuple("StaticCredentials").field(&shown).finish()
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn token_for_url(&self, _url: &str) -> Option<String> {
        self.0.clone()
    }
}
