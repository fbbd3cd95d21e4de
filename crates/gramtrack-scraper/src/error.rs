use gramtrack_core::Platform;
use thiserror::Error;

/// Errors surfaced by the scraping client.
#[derive(Debug, Error)]
pub enum ScraperError {
    /// The upstream asked us to back off: HTTP 429, a 401 carrying a
    /// rate-limit marker, or a "wait a few minutes" body. The queue
    /// re-queues the job with backoff; the cookie pool has already been
    /// advanced.
    #[error("rate limited by {platform} (retry after {retry_after_secs}s)")]
    RateLimited {
        platform: Platform,
        retry_after_secs: u64,
    },

    /// The credential is bad independently of rate. The cookie pool has
    /// been advanced; the caller sees a terminal error once credentials
    /// are exhausted.
    #[error("authentication failed on {platform}: {reason}")]
    AuthFailed { platform: Platform, reason: String },

    /// No usable credential in the pool (none configured, or every one is
    /// hard-failed awaiting auto-reset).
    #[error("no usable {platform} credential in the pool")]
    NoCredentials { platform: Platform },

    /// Network or TLS failure from the underlying HTTP client. Transient;
    /// retried internally before surfacing.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx status outside the classified cases. 5xx is transient and
    /// retried internally; anything else is surfaced immediately.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body does not match the expected shape — the upstream
    /// changed. Never auto-retried; surfaced for operator attention.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// 404 from the upstream; retrying would return the same result.
    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    /// Guard against runaway cursor pagination during media enumeration.
    #[error("pagination limit reached for {username}: exceeded {max_pages} pages")]
    PaginationLimit { username: String, max_pages: usize },

    /// A configured endpoint base is not a valid URL.
    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ScraperError {
    /// Returns `true` if `self` represents a transient condition worth an
    /// in-call retry after a backoff delay. Rate limits are deliberately
    /// excluded: those belong to the queue's global backoff, not the
    /// per-call loop.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ScraperError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ScraperError::UnexpectedStatus { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScraperError::RateLimited { .. })
    }

    /// Suggested wait for a rate-limited call, if that is what this is.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ScraperError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
