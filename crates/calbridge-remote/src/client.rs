//! Authenticated JSON client shared by both adapters
//!
//! Wraps `reqwest::Client` with a base URL, bearer authentication, fixed
//! per-service headers, and a bounded retry on HTTP 429 that honours the
//! `Retry-After` header. Every other failure is returned as a
//! [`RemoteError`]; retrying those is the engine's job.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::RemoteError;

/// Default retry-after duration when the header is missing or unparseable
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest wait honoured from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Retries on 429 before the error is handed to the caller
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Parses a `Retry-After` header value (delta-seconds or HTTP-date)
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(secs) = u64::try_from(diff.num_seconds()) {
            return Duration::from_secs(secs);
        }
        return Duration::ZERO;
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

fn retry_after_of(response: &Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .min(MAX_RETRY_AFTER)
}

/// HTTP client for one remote service
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: String,
    headers: Vec<(&'static str, String)>,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            headers: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Adds a header sent with every request (e.g. an API version)
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for a path relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method, &url)
            .bearer_auth(&self.access_token);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }
        builder
    }

    /// Sends a request, retrying on 429, and fails on any non-success status
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, RemoteError> {
        let mut attempt = 0;
        loop {
            let mut builder = self.request(method.clone(), path);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let retry_after = retry_after_of(&response);
                info!(
                    path,
                    attempt,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Received 429, backing off"
                );
                tokio::time::sleep(retry_after).await;
                attempt += 1;
                continue;
            }

            if status.is_success() {
                if attempt > 0 {
                    info!(path, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retry_after = retry_after_of(&response);
            let message = response.text().await.unwrap_or_default();
            debug!(path, status = status.as_u16(), %message, "Request failed");
            return Err(RemoteError::from_status(status, message, retry_after));
        }
    }

    /// Like [`execute`](Self::execute), decoding the JSON response body
    pub async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, RemoteError> {
        let response = self.execute(method, path, body).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::InvalidResponse(format!("{path}: {e}")))
    }
}

/// Everything but RFC 3986 unreserved characters
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes one path segment (`/`, `+` and spaces included)
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
