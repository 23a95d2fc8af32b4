//! End-to-end tests for `HttpUpstream` against an in-process range server.
//!
//! The fixture server runs `axum` on its own tokio runtime thread so the blocking reqwest client
//! used by `HttpUpstream` can be driven from plain `#[test]` functions.

#![cfg(feature = "http")]

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use remote_io::{
    HttpAuthConfig, HttpConfig, HttpUpstream, RangeRequest, ReadLength, RemoteStream,
    StreamingError, Upstream,
};

/// Minimal in-memory range server.
///
/// Serves one resource at `/resource.bin` and records every request as
/// `"<METHOD> <range or ->"` so tests can assert what reached the network.
struct RangeServer {
    data: Bytes,
    honour_ranges: bool,
    log: Mutex<Vec<String>>,
    seen_headers: Mutex<Vec<(String, String)>>,
}

impl RangeServer {
    fn new(len: usize) -> Self {
        Self {
            data: (0..len).map(|i| (i * 13 % 256) as u8).collect::<Vec<_>>().into(),
            honour_ranges: true,
            log: Mutex::new(Vec::new()),
            seen_headers: Mutex::new(Vec::new()),
        }
    }

    fn ignoring_ranges(mut self) -> Self {
        self.honour_ranges = false;
        self
    }

    fn gets(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with("GET"))
            .count()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Start the server and return the resource URL.
    ///
    /// - bind a `std::net::TcpListener` on `127.0.0.1:0`,
    /// - mark it non-blocking,
    /// - hand it to a dedicated runtime thread running `axum::serve`.
    fn start(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/resource.bin", get(serve_resource))
            .with_state(Arc::clone(self));

        let listener = std::net::TcpListener::bind("127.0.0.1:0")
            .expect("failed to bind local fixture server");
        listener
            .set_nonblocking(true)
            .expect("failed to set nonblocking on fixture listener");
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("failed to build fixture runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)
                    .expect("failed to convert fixture listener to tokio listener");
                axum::serve(listener, app).await.unwrap();
            });
        });

        format!("http://{addr}/resource.bin")
    }
}

fn parse_range(value: &str, total: u64) -> Option<u64> {
    let spec = value.strip_prefix("bytes=")?;
    let (first, last) = spec.split_once('-')?;
    if first.is_empty() {
        let suffix: u64 = last.parse().ok()?;
        return Some(total.saturating_sub(suffix));
    }
    first.parse().ok()
}

async fn serve_resource(
    State(server): State<Arc<RangeServer>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Ok(mut log) = server.log.lock() {
        log.push(format!("{method} {}", range.as_deref().unwrap_or("-")));
    }
    if let Ok(mut seen) = server.seen_headers.lock() {
        for (name, value) in &headers {
            seen.push((
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            ));
        }
    }

    let total = server.data.len() as u64;
    let mut out = HeaderMap::new();

    let start = match range {
        Some(ref value) if server.honour_ranges => match parse_range(value, total) {
            Some(start) => start,
            None => return StatusCode::BAD_REQUEST.into_response(),
        },
        _ => {
            out.insert(header::CONTENT_LENGTH, HeaderValue::from(total));
            return (StatusCode::OK, out, server.data.clone()).into_response();
        }
    };

    if start >= total {
        out.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes */{total}")).unwrap(),
        );
        return (StatusCode::RANGE_NOT_SATISFIABLE, out).into_response();
    }

    let body = server.data.slice(start as usize..);
    out.insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes {start}-{}/{total}", total - 1)).unwrap(),
    );
    out.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    (StatusCode::PARTIAL_CONTENT, out, body).into_response()
}

#[test]
fn http_trailer_read_and_cache_reuse() {
    let server = Arc::new(RangeServer::new(1024));
    let url = server.start();
    let mut stream = RemoteStream::new(HttpUpstream::from_url(url).unwrap());

    assert_eq!(stream.seek(SeekFrom::End(-16)).unwrap(), 1008);
    let trailer = stream.read_bytes(ReadLength::Bounded(16)).unwrap();
    assert_eq!(trailer.bytes(), &server.data[1008..]);
    assert_eq!(server.log(), vec!["HEAD -", "GET bytes=-16"]);

    stream.seek(SeekFrom::Start(1010)).unwrap();
    let again = stream.read_bytes(ReadLength::Bounded(6)).unwrap();
    assert_eq!(again.bytes(), &server.data[1010..1016]);
    assert_eq!(server.gets(), 1);
}

#[test]
fn http_scattered_reads() {
    let server = Arc::new(RangeServer::new(4096));
    let url = server.start();
    let mut stream = RemoteStream::new(HttpUpstream::from_url(url).unwrap());

    stream.seek(SeekFrom::Start(100)).unwrap();
    let a = stream.read_bytes(ReadLength::Bounded(50)).unwrap();
    stream.seek(SeekFrom::Start(3000)).unwrap();
    let b = stream.read_bytes(ReadLength::Bounded(50)).unwrap();

    assert_eq!(a.bytes(), &server.data[100..150]);
    assert_eq!(b.bytes(), &server.data[3000..3050]);
    assert_eq!(server.log(), vec!["GET bytes=100-", "GET bytes=3000-"]);
    assert_eq!(stream.known_size(), Some(4096));
    assert_eq!(stream.upstream_bytes(), 100);
}

#[test]
fn http_seek_past_end_yields_no_bytes() {
    let server = Arc::new(RangeServer::new(64));
    let url = server.start();
    let mut stream = RemoteStream::new(HttpUpstream::from_url(url).unwrap());

    stream.seek(SeekFrom::Start(100)).unwrap();
    assert_eq!(stream.known_size(), Some(64));
    let outcome = stream.read_bytes(ReadLength::Bounded(8)).unwrap();
    assert!(outcome.is_empty());
    assert!(!outcome.is_short());
}

#[test]
fn http_ignored_range_is_rejected() {
    let server = Arc::new(RangeServer::new(256).ignoring_ranges());
    let url = server.start();
    let upstream = HttpUpstream::from_url(url).unwrap();

    let err = upstream.fetch(RangeRequest::From(10)).unwrap_err();
    assert!(matches!(err, StreamingError::RangeNotSupported { .. }));

    // From zero, a full body is exactly the requested range
    let mut stream = RemoteStream::new(upstream);
    let outcome = stream.read_bytes(ReadLength::Bounded(32)).unwrap();
    assert_eq!(outcome.bytes(), &server.data[..32]);
}

#[test]
fn http_missing_resource_is_not_found() {
    let server = Arc::new(RangeServer::new(16));
    let url = server.start().replace("resource.bin", "missing.bin");
    let mut stream = RemoteStream::new(HttpUpstream::from_url(url).unwrap());

    let err = stream.read_bytes(ReadLength::Bounded(4)).unwrap_err();
    assert!(matches!(err, StreamingError::NotFound { .. }));
    assert_eq!(stream.resolve_size(), None);
}

#[test]
fn http_sends_auth_and_fixed_headers() {
    let server = Arc::new(RangeServer::new(32));
    let url = server.start();
    let config = HttpConfig {
        auth: Some(HttpAuthConfig::Bearer("t0ken".into())),
        headers: vec![("x-trace".into(), "abc".into())],
        ..HttpConfig::default()
    };
    let mut stream = RemoteStream::new(HttpUpstream::with_config(url, config).unwrap());

    stream.read_bytes(ReadLength::Bounded(4)).unwrap();

    let seen = server.seen_headers.lock().unwrap().clone();
    assert!(seen.contains(&("authorization".into(), "Bearer t0ken".into())));
    assert!(seen.contains(&("x-trace".into(), "abc".into())));
    assert!(
        seen.iter()
            .any(|(name, value)| name == "user-agent" && value.starts_with("remote-io/"))
    );
}

#[test]
fn http_streams_share_one_client() {
    let server = Arc::new(RangeServer::new(512));
    let url = server.start();
    let client = reqwest::blocking::Client::new();

    let first = HttpUpstream::with_client(client.clone(), url.clone(), HttpConfig::default());
    let second = HttpUpstream::with_client(client, url, HttpConfig::default());

    let mut a = RemoteStream::new(first);
    let mut b = RemoteStream::new(second);
    let head = a.read_bytes(ReadLength::Bounded(8)).unwrap();
    a.close();
    b.seek(SeekFrom::Start(500)).unwrap();
    let tail = b.read_bytes(ReadLength::ToEnd).unwrap();

    assert_eq!(head.bytes(), &server.data[..8]);
    assert_eq!(tail.bytes(), &server.data[500..]);
}
