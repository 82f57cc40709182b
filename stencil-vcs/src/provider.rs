//! The capability contract every VCS host implements.

use async_trait::async_trait;
use stencil_core::{
    Catalog, Credential, Entity, EntityRef, FileChangeSet, PullRequestResult, RepositoryLocation,
    Reviewer, TemplateInfo,
};

use crate::error::{HostError, SubmissionError};

/// Kind assumed for an owner reference that names none.
const OWNER_DEFAULT_KIND: &str = "group";

/// Read access to a repository tree.
#[async_trait]
pub trait TreeReader: Send + Sync {
    /// Every file under `location` (its subtree when a path is set), as
    /// forward-slash paths relative to that subtree.
    async fn list_files(&self, location: &RepositoryLocation) -> Result<Vec<String>, HostError>;

    /// Raw content of one file; `path` is relative to the location's subtree.
    async fn read_file(
        &self,
        location: &RepositoryLocation,
        path: &str,
    ) -> Result<Vec<u8>, HostError>;
}

/// One version-control host.
///
/// Implementations are registered once in a
/// [`VcsProviderRegistry`](crate::VcsProviderRegistry) and hold no per-run state.
#[async_trait]
pub trait VcsProvider: TreeReader {
    /// Short identifier, e.g. `github` or `gitlab`.
    fn name(&self) -> &str;

    /// Host the provider talks to.
    fn host(&self) -> &str;

    /// Cheap host match. Never performs I/O.
    fn can_handle(&self, url: &str) -> bool;

    /// Structured location for `url`; `None` on anything malformed.
    fn parse_url(&self, url: &str) -> Option<RepositoryLocation>;

    /// Canonical repository URL from the entity's annotations.
    fn extract_repo_url(&self, entity: &Entity) -> Option<String>;

    /// Reviewer for the entity's owner. Any failure along the way is `None`.
    async fn reviewer_for_owner(
        &self,
        entity: &Entity,
        catalog: &dyn Catalog,
        credential: &Credential,
    ) -> Option<Reviewer>;

    /// Commit `changes` on a fresh branch of `target_url` and open a pull request.
    ///
    /// The reviewer request happens after the PR exists and never fails the call.
    async fn create_pull_request(
        &self,
        target_url: &str,
        changes: &FileChangeSet,
        info: &TemplateInfo,
        reviewer: Option<&Reviewer>,
    ) -> Result<PullRequestResult, SubmissionError>;
}

/// Owner ref → `User` entity → `login_annotation`.
pub(crate) async fn owner_login(
    entity: &Entity,
    catalog: &dyn Catalog,
    credential: &Credential,
    login_annotation: &str,
) -> Option<Reviewer> {
    let owner = entity.owner()?;
    let owner_ref = match EntityRef::parse(owner, OWNER_DEFAULT_KIND) {
        Ok(r) => r,
        Err(err) => {
            tracing::debug!(entity = %entity.entity_ref(), %err, "unparseable owner");
            return None;
        }
    };
    let owner_entity = match catalog.entity_by_ref(&owner_ref, credential).await {
        Ok(Some(e)) => e,
        Ok(None) => {
            tracing::debug!(owner = %owner_ref, "owner not in catalog");
            return None;
        }
        Err(err) => {
            tracing::debug!(owner = %owner_ref, %err, "owner lookup failed");
            return None;
        }
    };
    if !owner_entity.is_kind("User") {
        return None;
    }
    owner_entity.annotation(login_annotation).map(Reviewer::from)
}
