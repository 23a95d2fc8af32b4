//! Range-fetching stream machinery.
//!
//! The pieces, leaves first:
//!
//! - [`RangeSet`] tracks which byte spans are already cached.
//! - [`LocalCache`] stores fetched bytes ([`MemoryCache`], [`FileCache`]).
//! - [`Upstream`] issues range and metadata requests ([`HttpUpstream`], [`LocalUpstream`]).
//! - [`RemoteStream`] ties them together behind seek/read/tell/close.
//!
//! # Features
//!
//! - **Minimal transfer**: only spans that a read touches are requested
//! - **Cache reuse**: re-reading a fetched span never goes back to the network
//! - **Drop-in I/O**: [`RemoteStream`] implements [`std::io::Read`] and [`std::io::Seek`]

mod cache;
mod error;
#[cfg(feature = "http")]
mod http;
mod local;
mod ranges;
mod remote;
mod source;

pub use cache::{FileCache, LocalCache, MemoryCache};
pub use error::StreamingError;
#[cfg(feature = "http")]
pub use http::{HttpAuthConfig, HttpConfig, HttpUpstream};
pub use local::LocalUpstream;
pub use ranges::{ByteRange, RangeSet};
pub use remote::{ReadLength, ReadOutcome, RemoteStream};
pub use source::{
    ContentRange, RangeRequest, ResponseMeta, StreamingResult, Upstream, UpstreamResponse,
};
