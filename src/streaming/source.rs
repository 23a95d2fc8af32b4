//! Trait defining the interface for upstream resources that serve byte ranges.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use super::error::StreamingError;

/// Result type for streaming operations.
pub type StreamingResult<T> = std::result::Result<T, StreamingError>;

/// A byte-range expression sent to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// Everything from `offset` to the end of the resource (`{offset}-`).
    From(u64),
    /// The last `n` bytes of the resource (`-{n}`).
    Suffix(u64),
}

impl RangeRequest {
    /// Value for an HTTP `Range` header, e.g. `bytes=512-`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={self}")
    }
}

impl fmt::Display for RangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From(offset) => write!(f, "{offset}-"),
            Self::Suffix(n) => write!(f, "-{n}"),
        }
    }
}

/// Parsed `Content-Range` header.
///
/// Accepts `bytes <first>-<last>/<total>`, `bytes <first>-<last>/*` and the unsatisfied form
/// `bytes */<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive `(first, last)` byte positions of the body, if the range was satisfied.
    pub span: Option<(u64, u64)>,
    /// Complete length of the resource, if the server disclosed it.
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parses a header value, returning `None` if it is malformed.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?;
        if !rest.starts_with([' ', '\t']) {
            return None;
        }
        let (span, total) = rest.trim_start().split_once('/')?;

        let span = match span.trim() {
            "*" => None,
            span => {
                let (first, last) = span.split_once('-')?;
                let first = first.trim().parse::<u64>().ok()?;
                let last = last.trim().parse::<u64>().ok()?;
                if last < first {
                    return None;
                }
                Some((first, last))
            }
        };
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse::<u64>().ok()?),
        };

        if span.is_none() && total.is_none() {
            return None;
        }
        Some(Self { span, total })
    }

    /// Offset of the first body byte, if the range was satisfied.
    #[must_use]
    pub fn first(&self) -> Option<u64> {
        self.span.map(|(first, _)| first)
    }
}

/// Size-related metadata from an upstream response.
///
/// Absence of both fields means the response says nothing about the resource size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Parsed `Content-Range`, if present and well-formed.
    pub content_range: Option<ContentRange>,
    /// `Content-Length` of this response, if present.
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    /// Total resource size implied by a response whose body begins at `anchor`.
    ///
    /// A `Content-Range` total wins. Without a `Content-Range`, the body is taken to run to the
    /// end of the resource, so `anchor + Content-Length` is the size.
    #[must_use]
    pub fn total_size(&self, anchor: u64) -> Option<u64> {
        match self.content_range {
            Some(range) => range.total,
            None => self
                .content_length
                .and_then(|len| anchor.checked_add(len)),
        }
    }
}

/// An upstream response: metadata plus a handle producing the body bytes.
pub struct UpstreamResponse {
    /// Size metadata from the response headers.
    pub meta: ResponseMeta,
    /// Body bytes, starting at the first byte of the requested range.
    pub body: Box<dyn Read + Send>,
}

impl UpstreamResponse {
    pub fn new(meta: ResponseMeta, body: impl Read + Send + 'static) -> Self {
        Self {
            meta,
            body: Box::new(body),
        }
    }

    /// A response with no body bytes, e.g. for a range starting past the end.
    #[must_use]
    pub fn empty(meta: ResponseMeta) -> Self {
        Self::new(meta, std::io::empty())
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// A remote resource that can be read in byte ranges.
///
/// Implementations own the transport: connections, TLS, timeouts and redirects are theirs to
/// handle. Errors are returned as-is to the caller of the stream; nothing is retried.
pub trait Upstream {
    /// Opens a ranged request and returns its metadata and body handle.
    ///
    /// Dropping the returned body releases the underlying request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the range.
    fn fetch(&self, range: RangeRequest) -> StreamingResult<UpstreamResponse>;

    /// Issues a metadata-only request (no body transfer).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn probe(&self) -> StreamingResult<ResponseMeta>;

    /// Returns a unique identifier for this resource, such as its URL or path.
    fn source_id(&self) -> &str;
}

impl<U: Upstream + ?Sized> Upstream for &U {
    fn fetch(&self, range: RangeRequest) -> StreamingResult<UpstreamResponse> {
        (**self).fetch(range)
    }

    fn probe(&self) -> StreamingResult<ResponseMeta> {
        (**self).probe()
    }

    fn source_id(&self) -> &str {
        (**self).source_id()
    }
}

impl<U: Upstream + ?Sized> Upstream for Arc<U> {
    fn fetch(&self, range: RangeRequest) -> StreamingResult<UpstreamResponse> {
        (**self).fetch(range)
    }

    fn probe(&self) -> StreamingResult<ResponseMeta> {
        (**self).probe()
    }

    fn source_id(&self) -> &str {
        (**self).source_id()
    }
}
