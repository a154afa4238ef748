//! Error taxonomy for the resolver. Connection-side failures are surfaced
//! through the connection state rather than as errors; a single bad frame
//! must never look like a dead stream.

/// Errors from the configuration-source resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("config URL is not valid: {0}")]
    UrlNotValid(String),

    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("could not decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The source itself is unusable (missing server, empty station list).
    #[error("source has no usable stations")]
    DataNotValid,

    /// Every source failed and the cache is empty.
    #[error("no station list available from any source")]
    DataNotFound,

    #[error("config file could not be read: {0}")]
    Io(#[from] std::io::Error),
}
