//! In-memory host and catalog fixtures shared by the orchestrator suites.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stencil_core::entity::SOURCE_LOCATION_ANNOTATION;
use stencil_core::{
    Catalog, Credential, Entity, EntityRef, FileChangeSet, InMemoryCatalog, PullRequestResult,
    RepositoryLocation, Reviewer, TemplateInfo,
};
use stencil_sync::SyncOrchestrator;
use stencil_vcs::{HostError, SubmissionError, TreeReader, VcsProvider, VcsProviderRegistry};

pub const HOST: &str = "fake.test";
pub const SLUG_ANNOTATION: &str = "fake.test/project-slug";
pub const LOGIN_ANNOTATION: &str = "fake.test/user-login";
pub const TEMPLATE_REF: &str = "template:default/node-service";

#[derive(Default)]
struct FakeRepo {
    files: BTreeMap<String, String>,
    listing_fails: bool,
    delay: Option<Duration>,
}

/// What the orchestrator asked the host to submit.
#[derive(Debug, Clone)]
pub struct Submission {
    pub url: String,
    pub changes: FileChangeSet,
    pub info: TemplateInfo,
    pub reviewer: Option<Reviewer>,
}

/// A VCS host whose repositories live in memory.
#[derive(Default)]
pub struct FakeHost {
    repos: BTreeMap<String, FakeRepo>,
    submissions: Mutex<Vec<Submission>>,
    scripted_failures: Mutex<VecDeque<SubmissionError>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo(mut self, slug: &str, files: &[(&str, &str)]) -> Self {
        let repo = self.repos.entry(slug.to_string()).or_default();
        for (path, content) in files {
            repo.files.insert(path.to_string(), content.to_string());
        }
        self
    }

    pub fn failing_listing(mut self, slug: &str) -> Self {
        self.repos.entry(slug.to_string()).or_default().listing_fails = true;
        self
    }

    pub fn slow(mut self, slug: &str, delay: Duration) -> Self {
        self.repos.entry(slug.to_string()).or_default().delay = Some(delay);
        self
    }

    /// Next submissions fail with these errors, in order, before any succeeds.
    pub fn fail_submissions(self, errors: Vec<SubmissionError>) -> Self {
        self.scripted_failures
            .lock()
            .unwrap()
            .extend(errors);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    fn lookup(&self, location: &RepositoryLocation) -> Option<&FakeRepo> {
        self.repos.get(&location.slug())
    }
}

pub fn rate_limited(retry_after: Option<Duration>) -> SubmissionError {
    SubmissionError::Host(HostError::RateLimited {
        url: format!("https://{HOST}/api"),
        retry_after,
    })
}

#[async_trait]
impl TreeReader for FakeHost {
    async fn list_files(&self, location: &RepositoryLocation) -> Result<Vec<String>, HostError> {
        let not_found = || HostError::NotFound {
            url: location.to_string(),
        };
        let repo = self.lookup(location).ok_or_else(not_found)?;
        if let Some(delay) = repo.delay {
            tokio::time::sleep(delay).await;
        }
        if repo.listing_fails {
            return Err(not_found());
        }
        Ok(repo
            .files
            .keys()
            .filter_map(|path| match location.path() {
                None => Some(path.clone()),
                Some(prefix) => path
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(str::to_string),
            })
            .collect())
    }

    async fn read_file(
        &self,
        location: &RepositoryLocation,
        path: &str,
    ) -> Result<Vec<u8>, HostError> {
        self.lookup(location)
            .and_then(|repo| repo.files.get(&location.repo_path(path)))
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| HostError::NotFound {
                url: format!("{location}/{path}"),
            })
    }
}

#[async_trait]
impl VcsProvider for FakeHost {
    fn name(&self) -> &str {
        "fake"
    }

    fn host(&self) -> &str {
        HOST
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with(&format!("https://{HOST}/"))
    }

    fn parse_url(&self, url: &str) -> Option<RepositoryLocation> {
        let rest = url.strip_prefix(&format!("https://{HOST}/"))?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let location = RepositoryLocation::new(HOST, *segments.first()?, *segments.get(1)?)?;
        Some(match &segments[2..] {
            ["tree", branch, path @ ..] => location.with_branch(*branch).with_path(path.join("/")),
            _ => location,
        })
    }

    fn extract_repo_url(&self, entity: &Entity) -> Option<String> {
        if let Some(source) = entity.annotation(SOURCE_LOCATION_ANNOTATION) {
            let source = source.strip_prefix("url:").unwrap_or(source);
            if self.parse_url(source).is_some() {
                return Some(source.to_string());
            }
        }
        entity
            .annotation(SLUG_ANNOTATION)
            .map(|slug| format!("https://{HOST}/{slug}/tree/main"))
    }

    async fn reviewer_for_owner(
        &self,
        entity: &Entity,
        catalog: &dyn Catalog,
        credential: &Credential,
    ) -> Option<Reviewer> {
        let owner = EntityRef::parse(entity.owner()?, "group").ok()?;
        let user = catalog.entity_by_ref(&owner, credential).await.ok()??;
        if !user.is_kind("User") {
            return None;
        }
        user.annotation(LOGIN_ANNOTATION).map(Reviewer::from)
    }

    async fn create_pull_request(
        &self,
        target_url: &str,
        changes: &FileChangeSet,
        info: &TemplateInfo,
        reviewer: Option<&Reviewer>,
    ) -> Result<PullRequestResult, SubmissionError> {
        if let Some(err) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(Submission {
            url: target_url.to_string(),
            changes: changes.clone(),
            info: info.clone(),
            reviewer: reviewer.cloned(),
        });
        let number = submissions.len() as u64;
        Ok(PullRequestResult {
            number,
            url: format!("{target_url}/pull/{number}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Catalog fixtures
// ---------------------------------------------------------------------------

pub fn template_ref() -> EntityRef {
    TEMPLATE_REF.parse().unwrap()
}

pub fn component_ref(name: &str) -> EntityRef {
    EntityRef::parse(name, "component").unwrap()
}

/// Template whose skeleton is `./skeleton` next to its own definition.
pub fn template_entity() -> Entity {
    let mut entity = Entity::new("Template", "node-service")
        .with_annotation(
            SOURCE_LOCATION_ANNOTATION,
            format!("url:https://{HOST}/acme/templates/tree/main/node/"),
        )
        .with_spec(json!({
            "steps": [
                { "id": "fetch", "action": "fetch:template", "input": { "url": "./skeleton" } },
                { "id": "publish", "action": "publish:fake" }
            ]
        }));
    entity.metadata.title = Some("Node Service".into());
    entity
}

pub fn component(name: &str) -> Entity {
    Entity::new("Component", name)
        .with_annotation(SLUG_ANNOTATION, format!("acme/{name}"))
        .with_spec(json!({
            "owner": "user:jdoe",
            "scaffoldedFrom": TEMPLATE_REF,
        }))
}

pub fn owner() -> Entity {
    Entity::new("User", "jdoe").with_annotation(LOGIN_ANNOTATION, "jdoe-fake")
}

pub const SKELETON_README: &str = "# ${{ values.name }}\n\nOwned by ${{ values.owner }}.\n";
pub const SKELETON_PACKAGE: &str = "{\"name\": \"${{ values.name }}\", \"version\": \"2.0.0\"}\n";

/// Host with the template repo plus one in-sync and one drifted target.
pub fn standard_host() -> FakeHost {
    FakeHost::new()
        .repo(
            "acme/templates",
            &[
                ("node/template.yaml", "kind: Template\n"),
                ("node/skeleton/README.md", SKELETON_README),
                ("node/skeleton/package.json", SKELETON_PACKAGE),
            ],
        )
        .repo(
            "acme/payments",
            &[
                ("README.md", "# payments\n\nOwned by user:jdoe.\n"),
                ("package.json", "{\"name\": \"payments\", \"version\": \"2.0.0\"}\n"),
                ("src/index.js", "console.log('payments');\n"),
            ],
        )
        .repo(
            "acme/billing",
            &[
                ("README.md", "# billing\n\nOwned by user:jdoe.\n"),
                ("package.json", "{\"name\": \"billing\", \"version\": \"1.0.0\"}\n"),
            ],
        )
}

pub fn standard_catalog(extra: Vec<Entity>) -> Arc<InMemoryCatalog> {
    let mut entities = vec![
        template_entity(),
        component("payments"),
        component("billing"),
        owner(),
    ];
    entities.extend(extra);
    Arc::new(InMemoryCatalog::new(entities))
}

pub fn orchestrator(host: Arc<FakeHost>, catalog: Arc<InMemoryCatalog>) -> SyncOrchestrator {
    let mut registry = VcsProviderRegistry::new();
    registry.register_provider(host);
    SyncOrchestrator::new(registry, catalog)
}
