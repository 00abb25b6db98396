//! The network transport seam.
//!
//! Normalizers only ever see `fetch(url, body, headers) -> bytes`; pooling,
//! TLS and any retry or timeout policy live behind this trait. Tests
//! substitute a canned transport the same way the engines use the real one.
//!
//! Cancellation: dropping a query future aborts the in-flight request,
//! including whichever sequential sub-request a HAFAS location-resolution
//! flow had outstanding. A cancelled request never produces a result.

use std::collections::HashMap;

use tracing::debug;

/// Failure in the transport layer, before any response body existed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URL could not be constructed or parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The server answered with a non-2xx status. The code is kept because
    /// normalizers special-case 404 on continuation calls as an expired
    /// session.
    #[error("HTTP status {status}")]
    Status { status: u16, body: Vec<u8> },

    /// Connection-level failure: DNS, TLS, timeout, reset.
    #[error("network error: {0}")]
    Network(String),
}

/// A successful raw response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// The body as UTF-8 text, lossily converted. Transit backends emit
    /// Latin-1 on some legacy endpoints; lossy conversion keeps the parse
    /// alive and the affected field values visibly mangled rather than
    /// failing the whole response.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The one capability the normalization engines consume.
pub trait Transport: Send + Sync {
    /// Issue a single request. A `body` turns the request into a POST.
    fn fetch(
        &self,
        url: &str,
        body: Option<&[u8]>,
        headers: &HashMap<String, String>,
    ) -> impl Future<Output = Result<FetchResponse, TransportError>> + Send;
}

/// Default [`Transport`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build with a fresh connection pool and the given request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    /// Wrap an already-configured client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &str,
        body: Option<&[u8]>,
        headers: &HashMap<String, String>,
    ) -> Result<FetchResponse, TransportError> {
        let url: reqwest::Url = url
            .parse()
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;

        debug!(url = %url, post = body.is_some(), "fetch");

        let mut request = match body {
            Some(body) => self.http.post(url).body(body.to_vec()),
            None => self.http.get(url),
        };
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.url().is_none() && e.is_builder() {
                TransportError::InvalidUrl(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();

        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status, body });
        }

        Ok(FetchResponse { status, body })
    }
}
