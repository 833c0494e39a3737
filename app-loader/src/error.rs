//! Error types for the app loader.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Errors raised by a key-value store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transition could not be encoded or decoded
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend unavailable or rejected the operation
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors talking to an upstream app.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Transport failure reported by a non-reqwest client
    #[error("upstream transport error: {0}")]
    Transport(String),
}

/// Errors building an auth profile from configuration.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("invalid {kind} pattern for app {app}: {source}")]
    InvalidPattern {
        app: String,
        kind: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Errors that abort a load request.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// The transition could not be written, so there is nothing to hand off
    #[error("failed to cache auth transition: {0}")]
    CacheWrite(#[source] StoreError),

    #[error("transition store error: {0}")]
    Cache(#[source] StoreError),

    #[error("invalid app URL {url}: {source}")]
    InvalidAppUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Result type alias using LoaderError.
pub type LoaderResult<T> = Result<T, LoaderError>;

impl ResponseError for LoaderError {
    fn status_code(&self) -> StatusCode {
        match self {
            LoaderError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // No body: the browser only ever sees the status
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).finish()
    }
}
