//! Best-effort repository tree download.

use futures::stream::{self, StreamExt};
use stencil_core::{FileSnapshot, RepositoryLocation};

use crate::error::FetchError;
use crate::provider::TreeReader;
use crate::registry::VcsProviderRegistry;

/// File reads in flight per fetch.
const READ_CONCURRENCY: usize = 8;

/// Read every file under `location` into a snapshot.
///
/// Listing failures abort the fetch. Files that cannot be read, or that are
/// not UTF-8 text, are left out.
pub async fn read_snapshot<R>(
    reader: &R,
    location: &RepositoryLocation,
) -> Result<FileSnapshot, FetchError>
where
    R: TreeReader + ?Sized,
{
    let paths = reader
        .list_files(location)
        .await
        .map_err(|source| FetchError::Listing {
            location: location.to_string(),
            source,
        })?;
    let listed = paths.len();

    let files: Vec<(String, String)> = stream::iter(paths)
        .map(|path| async move {
            match reader.read_file(location, &path).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => Some((path, text)),
                    Err(_) => {
                        tracing::debug!(%location, %path, "skipping non-UTF-8 file");
                        None
                    }
                },
                Err(err) => {
                    tracing::debug!(%location, %path, %err, "skipping unreadable file");
                    None
                }
            }
        })
        .buffer_unordered(READ_CONCURRENCY)
        .filter_map(|entry| async move { entry })
        .collect()
        .await;

    tracing::debug!(%location, listed, read = files.len(), "fetched repository tree");
    Ok(files.into_iter().collect())
}

/// Resolves a URL to its provider and reads the tree through it.
#[derive(Debug, Clone, Copy)]
pub struct RepoFileFetcher<'a> {
    registry: &'a VcsProviderRegistry,
}

impl<'a> RepoFileFetcher<'a> {
    pub fn new(registry: &'a VcsProviderRegistry) -> Self {
        Self { registry }
    }

    pub async fn fetch_files(&self, url: &str) -> Result<FileSnapshot, FetchError> {
        self.fetch(url).await.map(|(_, files)| files)
    }

    /// Like [`fetch_files`](Self::fetch_files), also returning where `url` points.
    pub async fn fetch(
        &self,
        url: &str,
    ) -> Result<(RepositoryLocation, FileSnapshot), FetchError> {
        let unsupported = || FetchError::Unsupported {
            url: url.to_string(),
        };
        let provider = self.registry.provider_for_url(url).ok_or_else(unsupported)?;
        let location = provider.parse_url(url).ok_or_else(unsupported)?;
        let files = read_snapshot(provider.as_ref(), &location).await?;
        Ok((location, files))
    }
}
