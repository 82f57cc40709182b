//! Batch pipeline: one template against many targets.
//!
//! ```text
//! ResolveTemplate → FetchTemplateFiles →
//!   for each target: ResolveProvider → ResolveTargetUrl → FetchTargetFiles → Diff
//!                    → (empty: skip | changes: compose + submit)
//! ```
//!
//! Template resolution and fetching are run-fatal. Everything after that is
//! per target: a failure is recorded for that target and the rest carry on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use stencil_core::config::SyncConfig;
use stencil_core::{
    Catalog, Credential, Entity, EntityRef, FileSnapshot, RepositoryLocation, TemplateInfo,
};
use stencil_vcs::{read_snapshot, FetchError, RepoFileFetcher, VcsProviderRegistry};
use tokio_util::sync::CancellationToken;

use crate::diff::{DiffOptions, TemplateDiffEngine};
use crate::error::SyncError;
use crate::report::{FailureStage, Preview, SkipReason, SyncReport, SyncResult};
use crate::retry::RetryPolicy;
use crate::template_source::{extract_template_source_url, fetch_step_url};
use crate::variables::TemplateVariables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Submit,
    Preview,
}

/// Template state shared read-only by every target of a run.
struct PreparedTemplate {
    entity: Entity,
    location: RepositoryLocation,
    files: FileSnapshot,
}

/// Run-level inputs threaded to each target.
struct RunContext<'a> {
    template: &'a PreparedTemplate,
    previous_version: &'a str,
    current_version: &'a str,
    credential: &'a Credential,
    mode: Mode,
}

pub struct SyncOrchestrator {
    registry: VcsProviderRegistry,
    catalog: Arc<dyn Catalog>,
    engine: TemplateDiffEngine,
    retry: RetryPolicy,
    concurrency: usize,
    target_timeout: Duration,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    /// Orchestrator with [`SyncConfig::default`] tuning.
    pub fn new(registry: VcsProviderRegistry, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            registry,
            catalog,
            engine: TemplateDiffEngine::default(),
            retry: RetryPolicy::default(),
            concurrency: 1,
            target_timeout: SyncConfig::default().target_timeout(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.engine = TemplateDiffEngine::new(DiffOptions {
            include_new_files: config.include_new_files,
        });
        self.retry = RetryPolicy::from(&config.retry);
        self.concurrency = config.concurrency.max(1);
        self.target_timeout = config.target_timeout();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token that stops the batch; targets not yet finished are reported as cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &VcsProviderRegistry {
        &self.registry
    }

    /// Catalog entities scaffolded from `template`.
    pub async fn discover_targets(
        &self,
        template: &EntityRef,
        credential: &Credential,
    ) -> Result<Vec<EntityRef>, SyncError> {
        let entities = self
            .catalog
            .scaffolded_from(template, credential)
            .await
            .map_err(|source| SyncError::Catalog {
                entity: template.to_string(),
                source,
            })?;
        Ok(entities.iter().map(Entity::entity_ref).collect())
    }

    /// Open pull requests for every drifted target.
    pub async fn sync_template(
        &self,
        template: &EntityRef,
        targets: &[EntityRef],
        previous_version: &str,
        current_version: &str,
        credential: &Credential,
    ) -> SyncReport {
        self.run(
            Mode::Submit,
            template,
            targets,
            previous_version,
            current_version,
            credential,
        )
        .await
    }

    /// Same pipeline without submitting: drifted targets come back as
    /// [`SyncResult::Previewed`].
    pub async fn preview(
        &self,
        template: &EntityRef,
        targets: &[EntityRef],
        previous_version: &str,
        current_version: &str,
        credential: &Credential,
    ) -> SyncReport {
        self.run(
            Mode::Preview,
            template,
            targets,
            previous_version,
            current_version,
            credential,
        )
        .await
    }

    async fn run(
        &self,
        mode: Mode,
        template: &EntityRef,
        targets: &[EntityRef],
        previous_version: &str,
        current_version: &str,
        credential: &Credential,
    ) -> SyncReport {
        let started_at = Utc::now();
        let prepared = match self.prepare(template, credential).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(%template, %err, "template sync aborted");
                return SyncReport::aborted(template.to_string(), err, started_at);
            }
        };

        let ctx = RunContext {
            template: &prepared,
            previous_version,
            current_version,
            credential,
            mode,
        };
        let ctx = &ctx;
        let results: BTreeMap<String, SyncResult> = stream::iter(targets)
            .map(move |target| async move {
                (target.to_string(), self.guarded_target(ctx, target).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = SyncReport {
            template: template.to_string(),
            started_at,
            finished_at: Utc::now(),
            aborted: None,
            results,
        };
        let summary = report.summary();
        tracing::info!(
            %template,
            created = summary.created,
            previewed = summary.previewed,
            skipped = summary.skipped,
            failed = summary.failed,
            "template sync finished"
        );
        report
    }

    /// Resolve the template entity and read its skeleton once.
    async fn prepare(
        &self,
        template: &EntityRef,
        credential: &Credential,
    ) -> Result<PreparedTemplate, SyncError> {
        let entity = self
            .catalog
            .entity_by_ref(template, credential)
            .await
            .map_err(|source| SyncError::Catalog {
                entity: template.to_string(),
                source,
            })?
            .ok_or_else(|| SyncError::TemplateNotFound {
                template: template.to_string(),
            })?;

        let step_url = fetch_step_url(&entity).ok_or_else(|| SyncError::NoFetchStep {
            template: template.to_string(),
        })?;
        let url = extract_template_source_url(&entity, &self.registry).ok_or_else(|| {
            SyncError::UnresolvedTemplateUrl {
                template: template.to_string(),
                url: step_url.to_string(),
            }
        })?;

        let (location, files) = RepoFileFetcher::new(&self.registry)
            .fetch(&url)
            .await
            .map_err(|err| match err {
                FetchError::Unsupported { url } => SyncError::NoTemplateProvider { url },
                other => SyncError::TemplateFetch(other),
            })?;
        tracing::info!(%template, %url, files = files.len(), "fetched template");

        Ok(PreparedTemplate {
            entity,
            location,
            files,
        })
    }

    /// One target under the cancellation token and the per-target deadline.
    async fn guarded_target(&self, ctx: &RunContext<'_>, target: &EntityRef) -> SyncResult {
        if self.cancel.is_cancelled() {
            return SyncResult::skipped(SkipReason::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!(%target, "cancelled");
                SyncResult::skipped(SkipReason::Cancelled)
            }
            outcome = tokio::time::timeout(self.target_timeout, self.sync_target(ctx, target)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(%target, timeout_secs = self.target_timeout.as_secs(), "target timed out");
                        SyncResult::failed(
                            FailureStage::Timeout,
                            format!("no result within {}s", self.target_timeout.as_secs()),
                        )
                    }
                }
            }
        }
    }

    async fn sync_target(&self, ctx: &RunContext<'_>, target: &EntityRef) -> SyncResult {
        let entity = match self.catalog.entity_by_ref(target, ctx.credential).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                tracing::debug!(%target, "target not in catalog; skipping");
                return SyncResult::skipped(SkipReason::EntityNotFound);
            }
            Err(err) => {
                tracing::error!(%target, %err, "target lookup failed");
                return SyncResult::failed(FailureStage::Resolve, err);
            }
        };

        let Some(provider) = self.registry.provider_for_entity(&entity) else {
            tracing::debug!(%target, "no provider for target; skipping");
            return SyncResult::skipped(SkipReason::NoProvider);
        };
        let Some((url, location)) = provider
            .extract_repo_url(&entity)
            .and_then(|url| provider.parse_url(&url).map(|loc| (url, loc)))
        else {
            tracing::debug!(%target, provider = provider.name(), "no repository url; skipping");
            return SyncResult::skipped(SkipReason::NoRepositoryUrl);
        };

        let current = match read_snapshot(provider.as_ref(), &location).await {
            Ok(files) => files,
            Err(err) => {
                tracing::error!(%target, %url, %err, "failed to fetch target files");
                return SyncResult::failed(FailureStage::Fetch, err);
            }
        };

        let known = TemplateVariables::from_entity(&entity);
        let changes = self
            .engine
            .compare(&ctx.template.files, &current, &known);
        if changes.is_empty() {
            tracing::debug!(%target, "no drift");
            return SyncResult::skipped(SkipReason::NoDrift);
        }

        if ctx.mode == Mode::Preview {
            let current = changes
                .paths()
                .filter_map(|p| current.get(p).map(|c| (p.to_string(), c.to_string())))
                .collect();
            return SyncResult::Previewed(Preview {
                url,
                changes,
                current,
            });
        }

        let reviewer = provider
            .reviewer_for_owner(&entity, self.catalog.as_ref(), ctx.credential)
            .await;
        let info = template_info(ctx, &entity);

        let provider = provider.as_ref();
        let (url_ref, changes_ref, info_ref, reviewer_ref) =
            (url.as_str(), &changes, &info, reviewer.as_ref());
        let label = target.to_string();
        let submitted = self
            .retry
            .run(&label, move || {
                provider.create_pull_request(url_ref, changes_ref, info_ref, reviewer_ref)
            })
            .await;
        match submitted {
            Ok(pr) => {
                tracing::info!(%target, number = pr.number, url = %pr.url, "pull request created");
                SyncResult::Created(pr)
            }
            Err(err) => {
                tracing::error!(%target, %url, %err, "pull request submission failed");
                SyncResult::failed(FailureStage::Submit, err)
            }
        }
    }
}

fn template_info(ctx: &RunContext<'_>, target: &Entity) -> TemplateInfo {
    let location = &ctx.template.location;
    TemplateInfo {
        owner: location.owner().to_string(),
        repo: location.repo().to_string(),
        branch: location.branch().map(str::to_string),
        display_name: ctx.template.entity.display_name().to_string(),
        previous_version: ctx.previous_version.to_string(),
        current_version: ctx.current_version.to_string(),
        component_name: target.metadata.name.clone(),
    }
}
