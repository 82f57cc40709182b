//! Thin JSON-over-HTTP client shared by the host providers.
//!
//! Owns the status mapping: 429 and exhausted-quota 403 responses become
//! [`HostError::RateLimited`] (with the server's wait hint), other 401/403
//! become [`HostError::Unauthorized`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::HostError;

const MAX_ERROR_BODY: usize = 200;

/// How the token is presented to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (GitHub).
    Bearer,
    /// `PRIVATE-TOKEN: <token>` (GitLab).
    PrivateToken,
}

#[derive(Debug, Clone)]
pub struct HostClient {
    http: Client,
    base: Url,
    auth: AuthScheme,
    fallback_token: Option<String>,
}

impl HostClient {
    /// `fallback_token` is used when the credentials provider has nothing for a URL.
    pub fn new(
        api_base: &str,
        auth: AuthScheme,
        fallback_token: Option<String>,
    ) -> Result<Self, HostError> {
        let invalid = |message: String| HostError::InvalidBaseUrl {
            base: api_base.to_string(),
            message,
        };
        let base = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) URL".into()));
        }
        let http = Client::builder()
            .user_agent(concat!("stencil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| HostError::Transport {
                url: api_base.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            auth,
            fallback_token,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Preferred token, else the integration's own.
    pub fn token(&self, preferred: Option<String>) -> Option<String> {
        preferred.or_else(|| self.fallback_token.clone())
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    pub fn endpoint<I, S>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: &Url, token: Option<&str>) -> RequestBuilder {
        let builder = self.http.request(method, url.clone());
        match (token, self.auth) {
            (Some(token), AuthScheme::Bearer) => {
                builder.header(AUTHORIZATION, format!("Bearer {token}"))
            }
            (Some(token), AuthScheme::PrivateToken) => builder.header("PRIVATE-TOKEN", token),
            (None, _) => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response, HostError> {
        let response = builder.send().await.map_err(|source| HostError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(url = %url, status = status.as_u16(), "host request failed");
        Err(classify(status, &headers, url.as_str(), &body, SystemTime::now()))
    }

    async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, HostError> {
        let bytes = response.bytes().await.map_err(|source| HostError::Transport {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| HostError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        token: Option<&str>,
    ) -> Result<T, HostError> {
        let response = self.send(self.request(Method::GET, url, token), url).await?;
        Self::decode(response, url).await
    }

    /// One page of a paginated listing plus the `x-next-page` cursor, if any.
    pub async fn get_json_page<T: DeserializeOwned>(
        &self,
        url: &Url,
        token: Option<&str>,
    ) -> Result<(T, Option<u32>), HostError> {
        let response = self.send(self.request(Method::GET, url, token), url).await?;
        let next = response
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        Ok((Self::decode(response, url).await?, next))
    }

    /// Raw bytes with an explicit `Accept` header.
    pub async fn get_raw(
        &self,
        url: &Url,
        token: Option<&str>,
        accept: &str,
    ) -> Result<Vec<u8>, HostError> {
        let request = self.request(Method::GET, url, token).header(ACCEPT, accept);
        let response = self.send(request, url).await?;
        let bytes = response.bytes().await.map_err(|source| HostError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    pub async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, HostError> {
        let request = self.request(method, url, token).json(body);
        let response = self.send(request, url).await?;
        Self::decode(response, url).await
    }

    /// Like [`send_json`](Self::send_json) but ignores the response body.
    pub async fn send_discarding<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &Url,
        token: Option<&str>,
        body: &B,
    ) -> Result<(), HostError> {
        let request = self.request(method, url, token).json(body);
        self.send(request, url).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Status classification
// ---------------------------------------------------------------------------

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// `Retry-After` seconds, else the reset epoch from GitHub/GitLab quota headers.
fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    if let Some(secs) = header(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset = header(headers, "x-ratelimit-reset")
        .or_else(|| header(headers, "ratelimit-reset"))
        .and_then(|v| v.parse::<u64>().ok())?;
    let now = now.duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    header(headers, "x-ratelimit-remaining")
        .or_else(|| header(headers, "ratelimit-remaining"))
        .is_some_and(|v| v == "0")
}

/// Best human-readable message from an error body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value.get("message").or_else(|| value.get("error"));
        match message {
            Some(Value::String(s)) => return s.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    body.trim().chars().take(MAX_ERROR_BODY).collect()
}

pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    url: &str,
    body: &str,
    now: SystemTime,
) -> HostError {
    let url = url.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => HostError::RateLimited {
            url,
            retry_after: retry_after(headers, now),
        },
        StatusCode::FORBIDDEN
            if quota_exhausted(headers) || headers.contains_key(RETRY_AFTER) =>
        {
            HostError::RateLimited {
                url,
                retry_after: retry_after(headers, now),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostError::Unauthorized {
            url,
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => HostError::NotFound { url },
        _ => HostError::Status {
            url,
            status: status.as_u16(),
            message: error_message(body),
        },
    }
}
