//! Local file upstream for testing without network.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::source::{
    ContentRange, RangeRequest, ResponseMeta, StreamingResult, Upstream, UpstreamResponse,
};

/// Local file served with HTTP range semantics.
///
/// Every fetch opens its own file handle, mirroring one request per range on a real server.
/// This makes it useful for tests and offline development against the same code paths as
/// [`HttpUpstream`](super::HttpUpstream).
#[derive(Debug, Clone)]
pub struct LocalUpstream {
    path: PathBuf,
    id: String,
    size: u64,
    size_headers: bool,
}

impl LocalUpstream {
    /// Opens a local file as an upstream.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file to serve
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its size cannot be determined.
    pub fn open<P: AsRef<Path>>(path: P) -> StreamingResult<Self> {
        let path = path.as_ref().to_path_buf();
        let size = File::open(&path)?.metadata()?.len();
        let id = path.to_string_lossy().into_owned();

        Ok(Self {
            path,
            id,
            size,
            size_headers: true,
        })
    }

    /// Stops reporting `Content-Range` and `Content-Length`, like a server that streams
    /// ranges without disclosing the resource size.
    #[must_use]
    pub fn without_size_headers(mut self) -> Self {
        self.size_headers = false;
        self
    }

    /// Returns the path to the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn meta(&self, content_range: ContentRange, content_length: Option<u64>) -> ResponseMeta {
        if !self.size_headers {
            return ResponseMeta::default();
        }
        ResponseMeta {
            content_range: Some(content_range),
            content_length,
        }
    }
}

impl Upstream for LocalUpstream {
    fn fetch(&self, range: RangeRequest) -> StreamingResult<UpstreamResponse> {
        let start = match range {
            RangeRequest::From(offset) => offset,
            RangeRequest::Suffix(n) => self.size.saturating_sub(n),
        };

        if start >= self.size || matches!(range, RangeRequest::Suffix(0)) {
            let unsatisfied = ContentRange {
                span: None,
                total: Some(self.size),
            };
            return Ok(UpstreamResponse::empty(self.meta(unsatisfied, None)));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(start))?;
        let len = self.size - start;

        let satisfied = ContentRange {
            span: Some((start, self.size - 1)),
            total: Some(self.size),
        };
        Ok(UpstreamResponse::new(
            self.meta(satisfied, Some(len)),
            file.take(len),
        ))
    }

    fn probe(&self) -> StreamingResult<ResponseMeta> {
        if !self.size_headers {
            return Ok(ResponseMeta::default());
        }
        Ok(ResponseMeta {
            content_range: None,
            content_length: Some(self.size),
        })
    }

    fn source_id(&self) -> &str {
        &self.id
    }
}
