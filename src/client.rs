//! Blocking HTTP client with tracing instrumentation.
//!
//! [`ApiClient`] wraps `reqwest::blocking::Client` and executes
//! [`ApiRequest`]s, returning the raw [`Exchange`] (request plus response)
//! that the dispatcher and the runtime-expression evaluator work on. All
//! calls are synchronous; every call carries the client's timeout
//! explicitly.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::blocking;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{instrument, Span};
use url::Url;

use crate::auth::Security;
use crate::error::{ApiError, ClientError};
use crate::media_type::MediaType;
use crate::request::ApiRequest;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Builder for configuring an [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: Url,
    timeout: Duration,
    default_headers: HeaderMap,
    security: Option<Arc<dyn Security>>,
    raise_on_error: bool,
}

impl ApiClientBuilder {
    fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_headers: HeaderMap::new(),
            security: None,
            raise_on_error: true,
        }
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a default header sent on every request. Default headers override
    /// per-operation headers of the same name.
    ///
    /// ## Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ApiError> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ClientError::Connection(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ClientError::Connection(format!("invalid header value: {e}")))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the security strategy applied to every outgoing request.
    pub fn security(mut self, security: impl Security + 'static) -> Self {
        self.security = Some(Arc::new(security));
        self
    }

    /// Controls the raise-on-error policy (default on): when enabled,
    /// responses with 4xx/5xx statuses that match a contract entry surface
    /// as [`crate::error::ResponseError`] instead of being returned as
    /// outcomes.
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Builds the [`ApiClient`].
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http = blocking::Client::builder()
            .build()
            .map_err(ClientError::Request)?;

        if let Some(security) = &self.security {
            security.attach_host(&self.base_url);
        }

        Ok(ApiClient {
            http,
            base_url: self.base_url,
            timeout: self.timeout,
            default_headers: self.default_headers,
            security: self.security,
            raise_on_error: self.raise_on_error,
        })
    }
}

/// Blocking HTTP client for executing contract operations.
///
/// Cloning is cheap: the underlying connection pool and security strategy
/// are shared. Pagination continuations hold a clone.
///
/// ## Examples
///
/// ```rust,ignore
/// use api_contract::ApiClient;
///
/// let client = ApiClient::from_host("api.swx.altairone.com")?
///     .security(BearerToken::new("my-token"))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: blocking::Client,
    base_url: Url,
    timeout: Duration,
    default_headers: HeaderMap,
    security: Option<Arc<dyn Security>>,
    raise_on_error: bool,
}

impl ApiClient {
    /// Creates a new builder for the given base URL.
    pub fn builder(base_url: Url) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    /// Creates a client with default settings.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        Self::builder(base_url).build()
    }

    /// Creates a builder from a host name, prepending `https://` when no
    /// scheme is present.
    ///
    /// ## Errors
    ///
    /// Returns an error if the normalized host is not a valid URL.
    pub fn from_host(host: &str) -> Result<ApiClientBuilder, ApiError> {
        let normalized = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ClientError::Connection(format!("invalid host '{host}': {e}")))?;
        Ok(ApiClientBuilder::new(base_url))
    }

    /// The base URL for this client.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether the raise-on-error policy is enabled.
    pub fn raises_on_error(&self) -> bool {
        self.raise_on_error
    }

    /// Resolves an operation path against the base URL.
    ///
    /// ## Errors
    ///
    /// Returns an error if the combined string is not a valid URL.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, ApiError> {
        let combined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&combined)
            .map_err(|e| ClientError::Connection(format!("invalid URL '{combined}': {e}")).into())
    }

    /// Executes a request and captures the full exchange.
    ///
    /// Default headers are merged in, the security strategy decorates the
    /// request, and the client timeout is applied. The response body is
    /// read to completion.
    ///
    /// ## Errors
    ///
    /// Returns an error if the security strategy fails or the transport
    /// call fails. Status codes are not interpreted here; that is the
    /// dispatcher's job.
    #[instrument(
        name = "api_request",
        skip(self, request),
        fields(
            http.method = tracing::field::Empty,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            otel.kind = "client",
        )
    )]
    pub fn execute(&self, mut request: ApiRequest) -> Result<Exchange, ApiError> {
        for (name, value) in &self.default_headers {
            request.headers.insert(name.clone(), value.clone());
        }

        if let Some(security) = &self.security {
            security.apply(&mut request)?;
        }

        Span::current().record("http.method", request.method.to_string().as_str());
        Span::current().record("http.url", request.url.as_str());

        let mut call = self
            .http
            .request(request.method.to_reqwest(), request.url.clone())
            .timeout(self.timeout)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            call = call.body(body.clone());
        }

        let response = call.send().map_err(ClientError::Request)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(ClientError::Request)?;

        Span::current().record("http.status_code", status.as_u16());

        Ok(Exchange {
            request,
            status,
            headers,
            body,
        })
    }
}

/// One completed HTTP exchange: the request as it went out and the raw
/// response. Runtime expressions address both sides.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The request as it was sent, headers and body included.
    pub request: ApiRequest,
    /// The response status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: Bytes,
}

impl Exchange {
    /// The named response header as text, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The parsed `Content-Type` of the response, if present and valid.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header_str("content-type")
            .and_then(|v| MediaType::parse(v).ok())
    }

    /// The response body as text, lossily decoded.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The response body parsed as JSON.
    ///
    /// ## Errors
    ///
    /// Returns the parse error if the body is not valid JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
