//! Seekable stream over an upstream resource, fetched lazily by byte range.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, trace, warn};

use super::cache::{LocalCache, MemoryCache};
use super::error::StreamingError;
use super::ranges::{ByteRange, RangeSet};
use super::source::{RangeRequest, ResponseMeta, StreamingResult, Upstream};

/// How many bytes a read should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLength {
    /// At most this many bytes.
    Bounded(u64),
    /// Everything up to the end of the resource.
    ToEnd,
}

impl From<u64> for ReadLength {
    fn from(n: u64) -> Self {
        Self::Bounded(n)
    }
}

/// Bytes produced by [`RemoteStream::read_bytes`].
///
/// A read is *short* when the upstream delivered fewer bytes than the span it was asked for.
/// Reads that stop at a known end of the resource are not short. Short reads are not errors:
/// the bytes that did arrive are returned and [`shortfall`](Self::shortfall) says how many are
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    bytes: Vec<u8>,
    shortfall: u64,
}

impl ReadOutcome {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes the upstream failed to deliver.
    #[must_use]
    pub fn shortfall(&self) -> u64 {
        self.shortfall
    }

    #[must_use]
    pub fn is_short(&self) -> bool {
        self.shortfall > 0
    }
}

impl AsRef<[u8]> for ReadOutcome {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// One open upstream request and how far into its body we have read.
struct Session {
    anchor: u64,
    consumed: u64,
    meta: ResponseMeta,
    body: Box<dyn Read + Send>,
}

impl Session {
    /// Offset of the next byte the body will produce.
    fn cursor(&self) -> u64 {
        self.anchor + self.consumed
    }

    /// Reads up to `limit` bytes, or until the body ends when `limit` is `None`.
    fn pull(&mut self, limit: Option<u64>) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        match limit {
            Some(n) => (&mut self.body).take(n).read_to_end(&mut buf)?,
            None => self.body.read_to_end(&mut buf)?,
        };
        self.consumed += buf.len() as u64;
        Ok(buf)
    }
}

/// Random-access reader over a remote resource.
///
/// Bytes are fetched from the [`Upstream`] only when a read touches a span that has not been
/// fetched before. Fetched bytes are written to the [`LocalCache`] and recorded in a
/// [`RangeSet`]; reads of recorded spans never touch the network.
///
/// At most one upstream request (a *session*) is open at a time. It is opened by [`seek`] or by
/// a read that misses the cache, reused while reads continue exactly where it left off, and
/// dropped before any replacement is opened.
///
/// The stream is not synchronized: share it between threads only behind your own lock.
///
/// [`seek`]: RemoteStream::seek
pub struct RemoteStream<U, C = MemoryCache> {
    upstream: U,
    cache: C,
    ranges: RangeSet,
    position: u64,
    session: Option<Session>,
    size: Option<u64>,
    upstream_bytes: u64,
    closed: bool,
}

impl<U: Upstream> RemoteStream<U> {
    /// Creates a stream caching into memory.
    pub fn new(upstream: U) -> Self {
        Self::with_cache(upstream, MemoryCache::new())
    }
}

impl<U: Upstream, C: LocalCache> RemoteStream<U, C> {
    /// Creates a stream caching into `cache`.
    ///
    /// Pass `&mut cache` to keep ownership of the cache; the stream never closes it.
    pub fn with_cache(upstream: U, cache: C) -> Self {
        Self {
            upstream,
            cache,
            ranges: RangeSet::new(),
            position: 0,
            session: None,
            size: None,
            upstream_bytes: 0,
            closed: false,
        }
    }

    /// Current position.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Total bytes pulled from the upstream so far.
    #[must_use]
    pub fn upstream_bytes(&self) -> u64 {
        self.upstream_bytes
    }

    /// Spans held in the local cache.
    #[must_use]
    pub fn cached_ranges(&self) -> &RangeSet {
        &self.ranges
    }

    /// Resource size, if it has been resolved. Never issues a request.
    #[must_use]
    pub fn known_size(&self) -> Option<u64> {
        self.size
    }

    /// Returns `true` while an upstream request is open.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Releases the open upstream request, if any. Further seeks and reads fail with
    /// [`StreamingError::Closed`]. Calling it again does nothing.
    pub fn close(&mut self) {
        self.close_session();
        self.closed = true;
    }

    /// Closes the stream and hands back its cache.
    pub fn into_cache(mut self) -> C {
        self.close();
        self.cache
    }

    /// Resolves the total size of the resource, caching the first answer for the lifetime of the
    /// stream.
    ///
    /// Strategies, first success wins:
    /// 1. a size already known, including one taken from a session's headers when it opened;
    /// 2. a metadata-only probe reporting `Content-Length`;
    /// 3. a ranged request from offset 0 reporting a `Content-Range` total (its body is dropped
    ///    unread). Skipped while a session is open, since that session's headers were already
    ///    inspected and at most one body may be in flight.
    ///
    /// Returns `None` if nothing works; transport errors along the way only downgrade the answer
    /// to "unknown".
    pub fn resolve_size(&mut self) -> Option<u64> {
        if let Some(size) = self.size {
            return Some(size);
        }

        match self.upstream.probe() {
            Ok(meta) => {
                if let Some(len) = meta.content_length {
                    return Some(self.record_size(len));
                }
            }
            Err(err) => debug!(source = self.upstream.source_id(), %err, "size probe failed"),
        }

        if self.session.is_some() {
            // One body in flight at a time
            debug!(source = self.upstream.source_id(), "resource size unknown");
            return None;
        }

        match self.upstream.fetch(RangeRequest::From(0)) {
            Ok(response) => {
                if let Some(total) = response.meta.total_size(0) {
                    return Some(self.record_size(total));
                }
            }
            Err(err) => debug!(source = self.upstream.source_id(), %err, "ranged size probe failed"),
        }

        debug!(source = self.upstream.source_id(), "resource size unknown");
        None
    }

    /// Moves the position, opening a new upstream request when the target is not cached.
    ///
    /// - Seeking to the current position is a no-op.
    /// - If the byte at the target (or, for [`SeekFrom::End`], the whole tail) is cached, or the
    ///   open session already sits at the target, only the position moves.
    /// - `SeekFrom::End` needs the resource size; it fails with [`StreamingError::SizeUnknown`]
    ///   when the size cannot be resolved. A non-negative end offset lands at or past the end,
    ///   where there is nothing to fetch.
    /// - Otherwise the open session is dropped and a new one requests `{target}-`, or `-{n}` for
    ///   end-relative seeks.
    ///
    /// # Errors
    ///
    /// Fails with [`StreamingError::Closed`] after [`close`](Self::close), with
    /// [`StreamingError::InvalidSeek`] for negative or overflowing targets, and with the
    /// upstream's error when a new request cannot be opened. The position is unchanged on error.
    pub fn seek(&mut self, pos: SeekFrom) -> StreamingResult<u64> {
        self.ensure_open()?;

        let (target, probe, request) = match pos {
            SeekFrom::Start(offset) => {
                (offset, one_byte(offset), Some(RangeRequest::From(offset)))
            }
            SeekFrom::Current(delta) => {
                let target = offset_position(self.position, delta)?;
                (target, one_byte(target), Some(RangeRequest::From(target)))
            }
            SeekFrom::End(delta) => {
                let size = self
                    .resolve_size()
                    .ok_or_else(|| StreamingError::SizeUnknown {
                        source_id: self.upstream.source_id().to_string(),
                    })?;
                let target = offset_position(size, delta)?;
                if delta >= 0 {
                    (target, ByteRange::new(target, target), None)
                } else {
                    let tail = RangeRequest::Suffix(delta.unsigned_abs());
                    (target, ByteRange::new(target, size), Some(tail))
                }
            }
        };

        if target == self.position {
            return Ok(target);
        }

        let cached = !probe.is_empty() && self.ranges.contains(probe.start, probe.end);
        let session_ready = self.session.as_ref().is_some_and(|s| s.cursor() == target);
        match request {
            Some(request) if !cached && !session_ready => {
                self.open_session(request, target)?;
            }
            _ => trace!(target, cached, session_ready, "seek without new request"),
        }

        self.position = target;
        Ok(target)
    }

    /// Reads from the current position and advances it by the number of bytes produced.
    ///
    /// The span is split into cached and uncached pieces. Cached pieces come from the local
    /// cache; each uncached piece is pulled from a session positioned exactly at its start, then
    /// written to the cache. If the upstream runs dry inside a piece the read stops there and
    /// the outcome reports the shortfall.
    ///
    /// [`ReadLength::ToEnd`] reads up to the resolved size. When the size cannot be resolved it
    /// reads until the upstream body ends, and that end is taken as the end of the resource.
    /// Cached bytes at the position are still served from the cache in that case.
    ///
    /// # Errors
    ///
    /// Fails with [`StreamingError::Closed`] after [`close`](Self::close), or with the upstream or
    /// cache error that interrupted the read.
    pub fn read_bytes(&mut self, len: ReadLength) -> StreamingResult<ReadOutcome> {
        self.ensure_open()?;

        let start = self.position;
        let end = match len {
            ReadLength::Bounded(0) => return Ok(ReadOutcome::default()),
            ReadLength::Bounded(n) => {
                let end = start.saturating_add(n);
                Some(self.size.map_or(end, |size| end.min(size)))
            }
            ReadLength::ToEnd => {
                if start == 0 {
                    warn!(
                        source = self.upstream.source_id(),
                        "reading the whole resource; range fetching saves nothing here"
                    );
                }
                self.resolve_size()
            }
        };

        let Some(end) = end else {
            return self.read_until_exhausted();
        };
        if end <= start {
            return Ok(ReadOutcome::default());
        }

        let mut bytes = Vec::new();
        for piece in self.ranges.partition(start, end) {
            if self.ranges.contains(piece.start, piece.end) {
                bytes.extend_from_slice(&self.read_cached(piece)?);
                continue;
            }

            trace!(%piece, "cache miss");
            let fetched = self.fill(piece.start, Some(piece.len()))?;
            let complete = fetched.len() as u64 == piece.len();
            bytes.extend_from_slice(&fetched);
            if !complete {
                break;
            }
        }

        let produced_end = start + bytes.len() as u64;
        let expected_end = self.size.map_or(end, |size| end.min(size));
        let shortfall = expected_end.saturating_sub(produced_end);
        if shortfall > 0 {
            warn!(
                source = self.upstream.source_id(),
                requested = end - start,
                received = bytes.len(),
                shortfall,
                "short read from upstream"
            );
        }

        self.position = produced_end;
        Ok(ReadOutcome { bytes, shortfall })
    }

    /// Reads until the upstream body ends when the resource size is unknown.
    ///
    /// Cached runs are still served from the cache. Gaps between them are pulled with a bound,
    /// and only the span past the last cached byte is pulled unbounded.
    fn read_until_exhausted(&mut self) -> StreamingResult<ReadOutcome> {
        let start = self.position;
        let mut cursor = start;
        let mut bytes = Vec::new();
        let mut shortfall = 0;

        loop {
            if let Some(run) = self.ranges.range_at(cursor) {
                bytes.extend_from_slice(&self.read_cached(ByteRange::new(cursor, run.end))?);
                cursor = run.end;
                continue;
            }

            let Some(next) = self.ranges.next_after(cursor) else {
                let fetched = self.fill(cursor, None)?;
                cursor += fetched.len() as u64;
                bytes.extend_from_slice(&fetched);
                if cursor > start {
                    self.record_size(cursor);
                }
                break;
            };

            let gap = next.start - cursor;
            let fetched = self.fill(cursor, Some(gap))?;
            cursor += fetched.len() as u64;
            bytes.extend_from_slice(&fetched);
            if cursor < next.start {
                shortfall = next.start - cursor;
                warn!(
                    source = self.upstream.source_id(),
                    received = bytes.len(),
                    shortfall,
                    "upstream ended before a cached range"
                );
                break;
            }
        }

        self.position = cursor;
        Ok(ReadOutcome { bytes, shortfall })
    }

    /// Reads a fully cached piece from the local cache.
    fn read_cached(&mut self, piece: ByteRange) -> StreamingResult<Vec<u8>> {
        trace!(%piece, "cache hit");
        let cached = self.cache.read_at(piece.start, span_len(piece)?)?;
        if cached.len() as u64 != piece.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("cache holds {} of {} bytes at {piece}", cached.len(), piece.len()),
            )
            .into());
        }
        Ok(cached)
    }

    /// Pulls bytes starting at `start` from upstream and caches them.
    fn fill(&mut self, start: u64, limit: Option<u64>) -> StreamingResult<Vec<u8>> {
        if !self.session.as_ref().is_some_and(|s| s.cursor() == start) {
            self.open_session(RangeRequest::From(start), start)?;
        }
        let session = self
            .session
            .as_mut()
            .ok_or(StreamingError::NoSession { offset: start })?;

        let bytes = match session.pull(limit) {
            Ok(bytes) => bytes,
            Err(err) => {
                // The body position is unknown after a failed read
                self.close_session();
                return Err(err.into());
            }
        };

        self.upstream_bytes += bytes.len() as u64;
        if !bytes.is_empty() {
            self.cache.write_at(start, &bytes)?;
            self.ranges.add(start, start + bytes.len() as u64);
        }
        Ok(bytes)
    }

    fn open_session(&mut self, request: RangeRequest, anchor: u64) -> StreamingResult<()> {
        self.close_session();

        let response = self.upstream.fetch(request)?;
        debug!(
            source = self.upstream.source_id(),
            %request,
            anchor,
            "opened upstream session"
        );
        if let Some(total) = response.meta.total_size(anchor) {
            self.record_size(total);
        }

        self.session = Some(Session {
            anchor,
            consumed: 0,
            meta: response.meta,
            body: response.body,
        });
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(
                anchor = session.anchor,
                consumed = session.consumed,
                meta = ?session.meta,
                "closed upstream session"
            );
        }
    }

    fn record_size(&mut self, size: u64) -> u64 {
        *self.size.get_or_insert_with(|| {
            debug!(size, "resolved resource size");
            size
        })
    }

    fn ensure_open(&self) -> StreamingResult<()> {
        if self.closed {
            return Err(StreamingError::Closed);
        }
        Ok(())
    }
}

fn one_byte(offset: u64) -> ByteRange {
    ByteRange::new(offset, offset.saturating_add(1))
}

fn offset_position(base: u64, delta: i64) -> StreamingResult<u64> {
    base.checked_add_signed(delta)
        .ok_or_else(|| StreamingError::InvalidSeek {
            reason: format!("position {base} offset by {delta} is out of range").into(),
        })
}

fn span_len(piece: ByteRange) -> io::Result<usize> {
    usize::try_from(piece.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "span exceeds address space"))
}

impl<U: Upstream, C: LocalCache> Read for RemoteStream<U, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let outcome = self.read_bytes(ReadLength::Bounded(buf.len() as u64))?;
        buf[..outcome.len()].copy_from_slice(outcome.bytes());
        Ok(outcome.len())
    }
}

impl<U: Upstream, C: LocalCache> Seek for RemoteStream<U, C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // Inherent method
        RemoteStream::seek(self, pos).map_err(io::Error::from)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

impl<U, C> fmt::Debug for RemoteStream<U, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("position", &self.position)
            .field("size", &self.size)
            .field("ranges", &self.ranges)
            .field("session_cursor", &self.session.as_ref().map(Session::cursor))
            .field("upstream_bytes", &self.upstream_bytes)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
