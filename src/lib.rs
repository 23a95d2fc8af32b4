//! Seekable, lazily fetched reads over remote HTTP resources.
//!
//! A [`RemoteStream`] behaves like a local random-access file while the bytes actually live
//! behind an HTTP endpoint. Bytes are pulled with range requests only when a read touches a span
//! that has not been fetched yet; everything already fetched is served from a local cache.
//!
//! ```ignore
//! use std::io::SeekFrom;
//! use remote_io::{HttpUpstream, ReadLength, RemoteStream};
//!
//! let upstream = HttpUpstream::from_url("https://cdn.example.com/archive.zip")?;
//! let mut stream = RemoteStream::new(upstream);
//!
//! // Only the trailer is downloaded.
//! stream.seek(SeekFrom::End(-22))?;
//! let trailer = stream.read_bytes(ReadLength::Bounded(22))?;
//! assert!(!trailer.is_short());
//! ```

pub mod streaming;

pub use streaming::{
    ByteRange, ContentRange, FileCache, LocalCache, LocalUpstream, MemoryCache, RangeRequest,
    RangeSet, ReadLength, ReadOutcome, RemoteStream, ResponseMeta, StreamingError,
    StreamingResult, Upstream, UpstreamResponse,
};

#[cfg(feature = "http")]
pub use streaming::{HttpAuthConfig, HttpConfig, HttpUpstream};
