use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Method};
use url::Url;

use crate::error::DispatchError;

/// A fully-formed request, sent to its target unmodified.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends fired callbacks.
///
/// One call is one exchange: no retries. Success means the exchange
/// completed; the response status is not inspected.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<(), DispatchError>;
}

/// [`Dispatcher`] backed by a shared `reqwest` client with default timeouts.
#[derive(Debug, Clone, Default)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, request: OutboundRequest) -> Result<(), DispatchError> {
        let OutboundRequest { method, url, mut headers, body } = request;

        // Owned by the client connection.
        for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION] {
            headers.remove(name);
        }

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match response {
            Ok(_) => Ok(()),
            Err(err) if err.is_timeout() => Err(DispatchError::Timeout),
            Err(err) if err.is_builder() => Err(DispatchError::InvalidRequest(err.to_string())),
            Err(err) => Err(DispatchError::Network(err.to_string())),
        }
    }
}
