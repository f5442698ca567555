//! HTTP transport capability.
//!
//! The shell owns the actual network stack; the core describes requests as
//! data. Transport-level failures (no response received) come back as
//! [`HttpError`], while HTTP-status-level failures come back as a normal
//! [`HttpResponse`] carrying the status code, so the two are never conflated.

use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Default per-request timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Upper bound accepted for a caller-supplied timeout.
pub const MAX_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub const fn allows_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small header map with case-insensitive names and last-write-wins
/// semantics. Header values are rejected if they could smuggle CR/LF into
/// the wire representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any existing header with the same
    /// (case-insensitive) name.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        if name.is_empty() || !name.is_ascii() || name.contains(|c: char| c.is_whitespace()) {
            return Err(HttpError::InvalidHeader {
                name: name.to_string(),
            });
        }
        if value.contains('\r') || value.contains('\n') {
            return Err(HttpError::InvalidHeader {
                name: name.to_string(),
            });
        }
        self.entries
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A fully-described outbound request. This is the Crux operation the shell
/// transport executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Option<Vec<u8>>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.min(MAX_TIMEOUT_MS);
        self
    }

    /// Attaches a JSON body and the matching content type.
    pub fn with_json_body(mut self, body: Vec<u8>) -> Result<Self, HttpError> {
        if !self.method.allows_body() {
            return Err(HttpError::BodyNotAllowed {
                method: self.method,
            });
        }
        self.headers.insert("content-type", "application/json")?;
        self.body = Some(body);
        Ok(self)
    }
}

impl Operation for HttpRequest {
    type Output = HttpResult;
}

/// A response the transport actually received. Any status, including 4xx and
/// 5xx, arrives through this type; only transport failures use [`HttpError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum HttpError {
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("invalid header: {name}")]
    InvalidHeader { name: String },

    #[error("{method} requests cannot carry a body")]
    BodyNotAllowed { method: HttpMethod },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("network failure: {message}")]
    Network { message: String },
}

pub type HttpResult = Result<HttpResponse, HttpError>;

/// The capability handle held in `Capabilities`.
pub struct Http<Ev> {
    context: CapabilityContext<HttpRequest, Ev>,
}

impl<Ev> crux_core::capability::Capability<Ev> for Http<Ev> {
    type Operation = HttpRequest;
    type MappedSelf<MappedEv> = Http<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Http::new(self.context.map_event(f))
    }
}

impl<Ev> Http<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<HttpRequest, Ev>) -> Self {
        Self { context }
    }

    /// Dispatches a request to the shell transport and feeds the result back
    /// as an event.
    pub fn send<F>(&self, request: HttpRequest, callback: F)
    where
        F: Fn(HttpResult) -> Ev + Send + Sync + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(request).await;
            context.update_app(callback(result));
        });
    }
}
