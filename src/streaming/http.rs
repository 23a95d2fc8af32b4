//! HTTP upstream implementation using reqwest.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::StreamingError;
use super::source::{
    ContentRange, RangeRequest, ResponseMeta, StreamingResult, Upstream, UpstreamResponse,
};

/// Configuration for HTTP range requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Authentication configuration.
    pub auth: Option<HttpAuthConfig>,
    /// Custom User-Agent header.
    pub user_agent: Option<String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            auth: None,
            user_agent: None,
            headers: Vec::new(),
        }
    }
}

/// Authentication configuration for HTTP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpAuthConfig {
    /// Bearer token authentication (e.g., for API tokens).
    Bearer(String),
    /// Custom header-based authentication.
    CustomHeader {
        /// Header name (e.g., "X-API-Key")
        name: String,
        /// Header value
        value: String,
    },
}

/// Remote resource reached over HTTP with `Range` requests.
///
/// The [`Client`] is a shared transport: clones of it reuse the same connection pool, and an
/// `HttpUpstream` never shuts it down. Each [`fetch`](Upstream::fetch) response owns its own
/// request; dropping it releases that request.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    url: String,
    client: Client,
    config: HttpConfig,
}

impl HttpUpstream {
    /// Creates an HTTP upstream from a URL with default configuration.
    ///
    /// No request is made until the first fetch or probe.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL of the resource to read
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_url(url: impl Into<String>) -> StreamingResult<Self> {
        Self::with_config(url, HttpConfig::default())
    }

    /// Creates an HTTP upstream with custom configuration and a dedicated client.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL of the resource to read
    /// * `config` - Timeout, user agent, auth and fixed headers
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, e.g. when the TLS backend fails to
    /// initialize.
    pub fn with_config(url: impl Into<String>, config: HttpConfig) -> StreamingResult<Self> {
        let mut client_builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs));

        if let Some(ref ua) = config.user_agent {
            client_builder = client_builder.user_agent(ua.clone());
        } else {
            client_builder =
                client_builder.user_agent(concat!("remote-io/", env!("CARGO_PKG_VERSION")));
        }

        let client = client_builder.build()?;
        Ok(Self::with_client(client, url, config))
    }

    /// Creates an HTTP upstream on top of an existing client.
    ///
    /// Timeouts and the user agent are whatever `client` was built with; only `auth` and
    /// `headers` from `config` are applied per request.
    pub fn with_client(client: Client, url: impl Into<String>, config: HttpConfig) -> Self {
        Self {
            url: url.into(),
            client,
            config,
        }
    }

    /// Returns the resource URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Applies authentication and fixed headers to a request.
    fn decorate(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = match &self.config.auth {
            Some(HttpAuthConfig::Bearer(token)) => {
                request.header(AUTHORIZATION, format!("Bearer {token}"))
            }
            Some(HttpAuthConfig::CustomHeader { name, value }) => {
                request.header(name.as_str(), value.as_str())
            }
            None => request,
        };
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    fn send(&self, request: RequestBuilder) -> StreamingResult<Response> {
        request.send().map_err(|err| {
            if err.is_timeout() {
                StreamingError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                StreamingError::Network(err)
            }
        })
    }

    fn status_error(&self, status: StatusCode) -> StreamingError {
        if status == StatusCode::NOT_FOUND {
            return StreamingError::NotFound {
                url: self.url.clone(),
            };
        }
        StreamingError::Http {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Unknown error").into(),
        }
    }
}

fn response_meta(headers: &HeaderMap) -> ResponseMeta {
    let content_range = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ContentRange::parse);
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());

    ResponseMeta {
        content_range,
        content_length,
    }
}

impl Upstream for HttpUpstream {
    fn fetch(&self, range: RangeRequest) -> StreamingResult<UpstreamResponse> {
        let request = self
            .decorate(self.client.get(&self.url))
            .header(RANGE, range.header_value());
        let response = self.send(request)?;
        let status = response.status();
        let meta = response_meta(response.headers());
        debug!(url = %self.url, %range, status = status.as_u16(), ?meta, "range response");

        match status {
            StatusCode::PARTIAL_CONTENT => Ok(UpstreamResponse::new(meta, response)),
            // A full body is the requested range only when the range starts at zero
            StatusCode::OK if range == RangeRequest::From(0) => {
                Ok(UpstreamResponse::new(meta, response))
            }
            StatusCode::OK => Err(StreamingError::RangeNotSupported {
                range: range.header_value(),
            }),
            // Range starts at or past the end: no bytes, but `bytes */<total>` is still useful
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(UpstreamResponse::empty(ResponseMeta {
                content_length: None,
                ..meta
            })),
            status => Err(self.status_error(status)),
        }
    }

    fn probe(&self) -> StreamingResult<ResponseMeta> {
        let response = self.send(self.decorate(self.client.head(&self.url)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status));
        }
        Ok(response_meta(response.headers()))
    }

    fn source_id(&self) -> &str {
        &self.url
    }
}
