//! Typed errors for crawl operations.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the server can
//! match on failure kinds without string inspection.

use thiserror::Error;

/// Errors that abort a crawl before any page is fetched.
///
/// Per-page fetch failures are *not* represented here - the engine absorbs
/// them into `CrawlResult.errors` and keeps going.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The seed website URL could not be parsed into a crawlable URL
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The seed URL has no host to scope the crawl to
    #[error("URL has no host: {url}")]
    NoHost { url: String },
}

/// Errors fetching a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, body read)
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Response was not an HTML document
    #[error("non-HTML content type {content_type} for {url}")]
    NotHtml { content_type: String, url: String },

    /// Request exceeded the per-page timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Malformed URL handed to the fetcher
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Result type alias for whole-crawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for single-page fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
