//! Calbridge Remote - HTTP adapters for the two stores
//!
//! Provides:
//! - [`GoogleCalendarStore`]: the calendar port over the Google Calendar v3 API
//! - [`NotionRecordStore`]: the record port over the Notion API
//!
//! ## Modules
//!
//! - [`client`] - Shared authenticated JSON client with 429 handling
//! - [`google`] - Calendar event listing and writes
//! - [`notion`] - Database schema, queries and page writes

pub mod client;
pub mod google;
pub mod notion;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use client::ApiClient;
pub use google::GoogleCalendarStore;
pub use notion::NotionRecordStore;

/// Errors returned by the remote APIs
///
/// Status codes appear in the messages so the engine can classify
/// transient failures from the formatted error chain.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials are missing, invalid or expired
    #[error("Unauthorized (401): {0}")]
    Unauthorized(String),

    /// The integration lacks access to the resource
    #[error("Forbidden (403): {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found (404): {0}")]
    NotFound(String),

    /// The resource existed but was deleted
    #[error("Gone (410): {0}")]
    Gone(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests (429), retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Maps a non-success status and its body to an error
    pub fn from_status(status: StatusCode, message: String, retry_after: Duration) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::GONE => Self::Gone(message),
            StatusCode::TOO_MANY_REQUESTS => Self::TooManyRequests { retry_after },
            s if s.is_server_error() => Self::ServerError {
                status: s.as_u16(),
                message,
            },
            s => Self::Api {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// True for 404 and 410, which deletes treat as success
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Gone(_))
    }
}
