//! First-match provider dispatch.

use std::sync::Arc;

use stencil_core::Entity;

use crate::provider::VcsProvider;

/// Providers in registration order. Built once at startup, then shared read-only.
#[derive(Clone, Default)]
pub struct VcsProviderRegistry {
    providers: Vec<Arc<dyn VcsProvider>>,
}

impl VcsProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn VcsProvider>) {
        tracing::debug!(provider = provider.name(), host = provider.host(), "registered provider");
        self.providers.push(provider);
    }

    /// First provider that both recognises and can parse `url`.
    pub fn provider_for_url(&self, url: &str) -> Option<Arc<dyn VcsProvider>> {
        self.providers
            .iter()
            .find(|p| p.can_handle(url) && p.parse_url(url).is_some())
            .cloned()
    }

    /// First provider able to extract a repository URL from `entity`.
    pub fn provider_for_entity(&self, entity: &Entity) -> Option<Arc<dyn VcsProvider>> {
        self.providers
            .iter()
            .find(|p| p.extract_repo_url(entity).is_some())
            .cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn VcsProvider>] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for VcsProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| format!("{}@{}", p.name(), p.host())))
            .finish()
    }
}
