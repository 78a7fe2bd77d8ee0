//! HTTP transport for the pipeline's call capability, backed by `reqwest`.
//!
//! Any response, whatever its status, is an `Ok(Response)`; only failures to obtain a response
//! at all (connect, I/O, protocol, body read) are `TransportError`s. A `Retry-After` header in
//! delta-seconds form becomes the response's retry hint.

use crate::{Request, Response, TransportError};
use futures::future::BoxFuture;
use reqwest::header::RETRY_AFTER;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Sends [`Request`]s relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Perform one raw attempt.
    pub async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method().as_bytes())
            .map_err(|e| TransportError::new(format!("invalid method {}: {}", request.method(), e)))?;
        let url = self.url_for(request.path());

        let resp = self
            .client
            .request(method, &url)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("{} {}: {}", request.method(), url, e)))?;

        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER));
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::new(format!("reading body from {}: {}", url, e)))?;

        tracing::debug!(url = %url, status, "upstream responded");
        let response = Response::new(status, body);
        Ok(match retry_after {
            Some(hint) => response.with_retry_after(hint),
            None => response,
        })
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    // HTTP-date form is ignored
    let seconds = value?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

impl Service<Request> for HttpTransport {
    type Response = Response;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Response, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.send(&request).await })
    }
}
