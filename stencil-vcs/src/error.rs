use std::time::Duration;

use stencil_composer::ComposeError;
use thiserror::Error;

/// Failure talking to a VCS host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("not authorized for {url} (status {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid API base URL {base}: {message}")]
    InvalidBaseUrl { base: String, message: String },
}

/// Failure listing a repository tree. Individual file reads never produce one.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no registered provider can read {url}")]
    Unsupported { url: String },

    #[error("failed to list files at {location}: {source}")]
    Listing {
        location: String,
        #[source]
        source: HostError,
    },
}

/// Failure opening a pull request.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("cannot parse target repository URL {url}")]
    InvalidUrl { url: String },

    #[error("branch {branch} already exists in {repository}")]
    BranchExists { repository: String, branch: String },

    #[error("refusing to open a pull request without changes")]
    EmptyChangeSet,

    #[error("no credentials available for {url}")]
    MissingCredentials { url: String },

    #[error("failed to compose pull request text: {0}")]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl SubmissionError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Host(HostError::RateLimited { .. }))
    }

    /// Server-suggested wait, when the host sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Host(HostError::RateLimited { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        let limited = SubmissionError::Host(HostError::RateLimited {
            url: "https://api.github.com/repos/a/b/pulls".into(),
            retry_after: Some(Duration::from_secs(7)),
        });
        assert!(limited.is_rate_limited());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let denied = SubmissionError::Host(HostError::Unauthorized {
            url: "https://api.github.com/repos/a/b/pulls".into(),
            status: 401,
        });
        assert!(!denied.is_rate_limited());
        assert_eq!(denied.retry_after(), None);
        assert!(!SubmissionError::EmptyChangeSet.is_rate_limited());
    }
}
