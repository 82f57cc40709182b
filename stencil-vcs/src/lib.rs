//! # stencil-vcs
//!
//! Host abstraction for template sync: the [`VcsProvider`] capability
//! contract, the first-match [`VcsProviderRegistry`], best-effort tree
//! fetching ([`RepoFileFetcher`]) and the GitHub / GitLab realizations.

pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod provider;
pub mod providers;
pub mod registry;

pub use credentials::{ConfigCredentials, CredentialsProvider, StaticCredentials};
pub use error::{FetchError, HostError, SubmissionError};
pub use fetcher::{read_snapshot, RepoFileFetcher};
pub use provider::{TreeReader, VcsProvider};
pub use providers::{registry_from_config, GithubProvider, GitlabProvider};
pub use registry::VcsProviderRegistry;
