pub mod diff;
pub mod providers;
pub mod resolve;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use stencil_composer::PullRequestComposer;
use stencil_core::config::SyncConfig;
use stencil_core::{Catalog, Config, Credential, EntityRef, FileCatalog};
use stencil_sync::{CancellationToken, SyncOrchestrator, SyncReport};
use stencil_vcs::{registry_from_config, ConfigCredentials, VcsProviderRegistry};

use crate::GlobalArgs;

/// Kind assumed for a template reference without one.
const TEMPLATE_KIND: &str = "template";
/// Kind assumed for a target reference without one.
const TARGET_KIND: &str = "component";

// ---------------------------------------------------------------------------
// Environment: home, config, and what is built from them
// ---------------------------------------------------------------------------

pub struct Environment {
    pub home: PathBuf,
    pub config: Config,
}

impl Environment {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let config = match global.config.as_deref() {
            Some(path) => Config::load_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::load_at(&home).context("failed to load ~/.stencil/config.yaml")?,
        };
        Ok(Self { home, config })
    }

    pub fn registry(&self) -> Result<VcsProviderRegistry> {
        let composer =
            PullRequestComposer::with_overrides(self.config.compose.template_dir.as_deref())
                .context("failed to load pull request templates")?;
        let credentials = ConfigCredentials::from_config(&self.config.integrations);
        registry_from_config(&self.config, Arc::new(credentials), Arc::new(composer))
            .context("invalid provider integration")
    }

    pub fn catalog(&self) -> Result<FileCatalog> {
        let dir = self.config.catalog_dir_at(&self.home);
        FileCatalog::load_at(&dir)
            .with_context(|| format!("failed to load catalog from {}", dir.display()))
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

// ---------------------------------------------------------------------------
// Batch arguments shared by `sync` and `diff`
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Template entity, e.g. `template:default/node-service`.
    pub template: String,

    /// Target entity; repeatable. Defaults to every entity scaffolded from the template.
    #[arg(long = "target", value_name = "REF")]
    pub targets: Vec<String>,

    /// Template version the targets were generated from.
    #[arg(long, default_value = "")]
    pub previous_version: String,

    /// Also propose template files the target does not have yet.
    #[arg(long)]
    pub include_new_files: bool,

    /// Targets processed at once (overrides `sync.concurrency`).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,
}

impl BatchArgs {
    fn sync_config(&self, base: &SyncConfig) -> SyncConfig {
        let mut config = base.clone();
        if self.include_new_files {
            config.include_new_files = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        config
    }

    fn template_ref(&self) -> Result<EntityRef> {
        EntityRef::parse(&self.template, TEMPLATE_KIND).map_err(anyhow::Error::from)
    }

    fn target_refs(&self) -> Result<Vec<EntityRef>> {
        self.targets
            .iter()
            .map(|t| EntityRef::parse(t, TARGET_KIND).map_err(anyhow::Error::from))
            .collect()
    }
}

/// Whether drifted targets get pull requests or only previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Submit,
    Preview,
}

/// Run one template batch. Ctrl-C cancels the remaining targets; the report
/// still holds whatever finished.
pub fn run_batch(
    env: &Environment,
    batch: &BatchArgs,
    current_version: &str,
    mode: BatchMode,
) -> Result<SyncReport> {
    let template = batch.template_ref()?;
    let targets = batch.target_refs()?;
    let catalog: Arc<dyn Catalog> = Arc::new(env.catalog()?);
    let cancel = CancellationToken::new();
    let orchestrator = SyncOrchestrator::new(env.registry()?, catalog)
        .with_config(&batch.sync_config(&env.config.sync))
        .with_cancellation(cancel.clone());

    runtime()?.block_on(execute(
        &orchestrator,
        cancel,
        &template,
        targets,
        &batch.previous_version,
        current_version,
        mode,
    ))
}

async fn execute(
    orchestrator: &SyncOrchestrator,
    cancel: CancellationToken,
    template: &EntityRef,
    targets: Vec<EntityRef>,
    previous_version: &str,
    current_version: &str,
    mode: BatchMode,
) -> Result<SyncReport> {
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling remaining targets");
            cancel.cancel();
        }
    });

    let credential = Credential::anonymous();
    let targets = if targets.is_empty() {
        orchestrator
            .discover_targets(template, &credential)
            .await
            .with_context(|| format!("failed to discover targets of {template}"))?
    } else {
        targets
    };
    tracing::debug!(%template, targets = targets.len(), "starting template batch");

    let report = match mode {
        BatchMode::Submit => {
            orchestrator
                .sync_template(template, &targets, previous_version, current_version, &credential)
                .await
        }
        BatchMode::Preview => {
            orchestrator
                .preview(template, &targets, previous_version, current_version, &credential)
                .await
        }
    };
    watcher.abort();
    Ok(report)
}
