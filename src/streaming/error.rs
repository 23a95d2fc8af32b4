//! Error types for streaming operations.

use std::borrow::Cow;
use std::io;

use thiserror::Error;

/// Errors that can occur while seeking in or reading from a remote stream.
#[derive(Debug, Error)]
pub enum StreamingError {
    /// HTTP error response from the server.
    #[error("HTTP error: {status} - {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error message or response body
        message: String,
    },

    /// Server ignored the `Range` header and answered with the full body.
    #[error("Server does not support range requests (got a full response for {range})")]
    RangeNotSupported {
        /// The range expression that was requested
        range: String,
    },

    /// Network error during HTTP request.
    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout in seconds
        timeout_secs: u64,
    },

    /// Resource not found (HTTP 404).
    #[error("Resource not found: {url}")]
    NotFound {
        /// URL that was not found
        url: String,
    },

    /// I/O error from the upstream body or the local cache.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The seek target is negative or does not fit in a `u64`.
    #[error("Invalid seek: {reason}")]
    InvalidSeek {
        /// Why the target was rejected
        reason: Cow<'static, str>,
    },

    /// The total size was required but no resolution strategy produced it.
    #[error("Size of {source_id} could not be resolved")]
    SizeUnknown {
        /// Identifier of the upstream resource
        source_id: String,
    },

    /// A cache miss had to be filled but no upstream session was open.
    ///
    /// This indicates a bug in the stream state machine rather than a transport failure.
    #[error("No upstream session open at offset {offset}")]
    NoSession {
        /// Offset the missing session was expected at
        offset: u64,
    },

    /// The stream was closed.
    #[error("Stream is closed")]
    Closed,
}

impl From<StreamingError> for io::Error {
    fn from(err: StreamingError) -> Self {
        match err {
            StreamingError::Io(inner) => inner,
            StreamingError::InvalidSeek { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            StreamingError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            StreamingError::Timeout { .. } => io::Error::new(io::ErrorKind::TimedOut, err),
            StreamingError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err),
            StreamingError::SizeUnknown { .. } | StreamingError::RangeNotSupported { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            other => io::Error::other(other),
        }
    }
}
