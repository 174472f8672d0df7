use crate::page::NodeKey;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch page {url}: {source}")]
    PageFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure to retrieve a single URL.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not resolve script source '{0}'")]
    Unresolvable(String),
}

/// Lookup failure in a [`DocumentIndex`](crate::document::DocumentIndex).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("node {0} is not part of the document index")]
    NotFound(NodeKey),
}

pub type Result<T> = std::result::Result<T, ScanError>;
