//! `~/.stencil/config.yaml`: host integrations and sync tuning.
//!
//! ```yaml
//! integrations:
//!   github:
//!     - host: github.com
//!       token_env: GITHUB_TOKEN
//!   gitlab:
//!     - host: gitlab.example.com
//!       api_base_url: https://gitlab.example.com/api/v4
//!       token_env: GITLAB_TOKEN
//! sync:
//!   concurrency: 4
//!   target_timeout_secs: 120
//!   include_new_files: false
//!   retry:
//!     max_attempts: 3
//! catalog:
//!   path: /srv/catalog
//! compose:
//!   template_dir: /srv/stencil/templates
//! ```
//!
//! A missing file is not an error: [`Config::default`] is returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub integrations: IntegrationsConfig,
    pub sync: SyncConfig,
    pub catalog: CatalogConfig,
    pub compose: ComposeConfig,
}

/// Per-host integration lists. Empty lists fall back to the public SaaS host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub github: Vec<HostIntegration>,
    pub gitlab: Vec<HostIntegration>,
}

/// One configured VCS host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIntegration {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Inline token. Prefer `token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl HostIntegration {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_base_url: None,
            token: None,
            token_env: None,
        }
    }

    /// Inline token first, then the named environment variable.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                self.token_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
                    .filter(|t| !t.trim().is_empty())
            })
    }
}

/// Batch pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Targets processed at once. `1` keeps the sequential behaviour.
    pub concurrency: usize,
    /// Deadline for one target's fetch + diff + submit.
    pub target_timeout_secs: u64,
    /// Also propose template files missing from the target.
    pub include_new_files: bool,
    /// Branch assumed when an annotation gives no ref.
    pub default_branch: String,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            target_timeout_secs: 120,
            include_new_files: false,
            default_branch: "main".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }
}

/// Backoff applied to rate-limited submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory of entity YAML files; defaults to `~/.stencil/catalog`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// `.tera` overrides for commit message / PR title / PR body.
    pub template_dir: Option<PathBuf>,
}

impl Config {
    /// `<home>/.stencil/config.yaml`: pure, no I/O.
    pub fn path_at(home: &Path) -> PathBuf {
        home.join(".stencil").join("config.yaml")
    }

    /// Load `<home>/.stencil/config.yaml`, defaulting when absent.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::load_at(&home)
    }

    /// Load an explicit file; the file must exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.concurrency == 0 {
            return Err(ConfigError::Invalid("sync.concurrency must be at least 1".into()));
        }
        if self.sync.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sync.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.sync.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "sync.retry.backoff_factor must be >= 1.0".into(),
            ));
        }
        let hosts = self
            .integrations
            .github
            .iter()
            .chain(self.integrations.gitlab.iter());
        for integration in hosts {
            if integration.host.trim().is_empty() {
                return Err(ConfigError::Invalid("integration host must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Catalog directory, honouring `catalog.path`.
    pub fn catalog_dir_at(&self, home: &Path) -> PathBuf {
        self.catalog
            .path
            .clone()
            .unwrap_or_else(|| crate::catalog::default_dir_at(home))
    }
}
